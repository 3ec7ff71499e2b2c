//! Order Validator
//!
//! Pure validation of a cart against a consistent wallet/product
//! snapshot. No side effects: the settlement engine calls this against
//! version-guarded reads and commits only if those versions still hold,
//! which closes the validate-then-commit race window.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DomainError, Money, OrderItem, Product, Wallet};

/// One requested cart line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Successful validation: the exact total and fully resolved order
/// lines. The engine reuses these prices instead of re-reading the
/// catalog, so the committed order can never observe different data
/// than the validated snapshot.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub total: Money,
    pub lines: Vec<OrderItem>,
}

/// Validate a cart against wallet and product snapshots.
///
/// Checks run in a fixed order with first-failure-wins semantics:
/// 1. cart shape (non-empty, positive quantities)
/// 2. product existence / tenant / availability
/// 3. blacklist membership
/// 4. stock coverage
/// 5. exact fixed-point total
/// 6. balance + credit line coverage
/// 7. daily spending cap (`spent_today` = DEBIT entries since the
///    tenant-local start of day, supplied by the caller)
pub fn validate_order(
    wallet: &Wallet,
    products: &[Product],
    items: &[CartItem],
    spent_today: Money,
) -> Result<ValidationOutcome, DomainError> {
    if items.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    for item in items {
        if item.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                product_id: item.product_id,
            });
        }
    }

    for item in items {
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or(DomainError::UnknownProduct(item.product_id))?;
        if product.tenant_id != wallet.tenant_id {
            return Err(DomainError::UnknownProduct(item.product_id));
        }
        if !product.is_available {
            return Err(DomainError::ProductUnavailable(item.product_id));
        }
    }

    for item in items {
        if wallet.blacklist.contains(&item.product_id) {
            return Err(DomainError::BlacklistedProduct(item.product_id));
        }
    }

    // Stock is checked against the summed quantity per product so that
    // duplicate cart lines cannot slip past a per-line check.
    for product_id in referenced_product_ids(items) {
        let requested: u32 = items
            .iter()
            .filter(|i| i.product_id == product_id)
            .map(|i| i.quantity)
            .sum();
        let product = products
            .iter()
            .find(|p| p.id == product_id)
            .ok_or(DomainError::UnknownProduct(product_id))?;
        if product.stock < requested {
            return Err(DomainError::InsufficientStock {
                product_id: product.id,
                requested,
                available: product.stock,
            });
        }
    }

    let mut total = Money::zero();
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or(DomainError::UnknownProduct(item.product_id))?;

        let line_total = product
            .price
            .times(item.quantity)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;
        total = total
            .checked_add(line_total)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        lines.push(OrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: item.quantity,
            unit_price: product.price,
            line_total,
        });
    }

    let available = wallet.available_funds();
    if available < total {
        return Err(DomainError::InsufficientFunds {
            required: total.value(),
            available: available.value(),
        });
    }

    if wallet.daily_spending_limit.is_positive() {
        let projected = spent_today
            .checked_add(total)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;
        if projected > wallet.daily_spending_limit {
            return Err(DomainError::DailyLimitExceeded {
                limit: wallet.daily_spending_limit.value(),
                spent_today: spent_today.value(),
                attempted: total.value(),
            });
        }
    }

    Ok(ValidationOutcome { total, lines })
}

/// Deduplicated product ids referenced by a cart, in first-seen order.
pub fn referenced_product_ids(items: &[CartItem]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::with_capacity(items.len());
    for item in items {
        if !ids.contains(&item.product_id) {
            ids.push(item.product_id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn money(v: rust_decimal::Decimal) -> Money {
        Money::new(v).unwrap()
    }

    fn wallet(balance: rust_decimal::Decimal, credit: rust_decimal::Decimal, daily: rust_decimal::Decimal) -> Wallet {
        Wallet {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            owner_name: "Ana".to_string(),
            balance: money(balance),
            credit_limit: money(credit),
            daily_spending_limit: money(daily),
            blacklist: HashSet::new(),
            version: 1,
        }
    }

    fn product(wallet: &Wallet, price: rust_decimal::Decimal, stock: u32) -> Product {
        Product {
            id: Uuid::new_v4(),
            tenant_id: wallet.tenant_id,
            name: "Snack".to_string(),
            price: money(price),
            stock,
            is_available: true,
            version: 1,
        }
    }

    #[test]
    fn test_empty_cart_rejected() {
        let w = wallet(dec!(20.00), dec!(0), dec!(0));
        let err = validate_order(&w, &[], &[], Money::zero()).unwrap_err();
        assert_eq!(err, DomainError::EmptyCart);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let w = wallet(dec!(20.00), dec!(0), dec!(0));
        let p = product(&w, dec!(5.00), 10);
        let items = [CartItem { product_id: p.id, quantity: 0 }];
        let err = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap_err();
        assert_eq!(err, DomainError::InvalidQuantity { product_id: p.id });
    }

    #[test]
    fn test_unknown_and_foreign_tenant_products_rejected() {
        let w = wallet(dec!(20.00), dec!(0), dec!(0));
        let missing = Uuid::new_v4();
        let items = [CartItem { product_id: missing, quantity: 1 }];
        let err = validate_order(&w, &[], &items, Money::zero()).unwrap_err();
        assert_eq!(err, DomainError::UnknownProduct(missing));

        let mut foreign = product(&w, dec!(5.00), 10);
        foreign.tenant_id = Uuid::new_v4();
        let items = [CartItem { product_id: foreign.id, quantity: 1 }];
        let err = validate_order(&w, &[foreign.clone()], &items, Money::zero()).unwrap_err();
        assert_eq!(err, DomainError::UnknownProduct(foreign.id));
    }

    #[test]
    fn test_unavailable_product_rejected() {
        let w = wallet(dec!(20.00), dec!(0), dec!(0));
        let mut p = product(&w, dec!(5.00), 10);
        p.is_available = false;
        let items = [CartItem { product_id: p.id, quantity: 1 }];
        let err = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap_err();
        assert_eq!(err, DomainError::ProductUnavailable(p.id));
    }

    #[test]
    fn test_blacklisted_product_rejects_whole_cart() {
        let mut w = wallet(dec!(100.00), dec!(0), dec!(0));
        let allowed = product(&w, dec!(5.00), 10);
        let blocked = product(&w, dec!(3.00), 10);
        w.blacklist.insert(blocked.id);

        let items = [
            CartItem { product_id: allowed.id, quantity: 1 },
            CartItem { product_id: blocked.id, quantity: 1 },
        ];
        let err = validate_order(
            &w,
            &[allowed.clone(), blocked.clone()],
            &items,
            Money::zero(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::BlacklistedProduct(blocked.id));
    }

    #[test]
    fn test_spec_example_stock_then_success() {
        // balance 20.00, credit 0, daily limit 35.00, price 12.50, stock 1
        let w = wallet(dec!(20.00), dec!(0), dec!(35.00));
        let p = product(&w, dec!(12.50), 1);

        // quantity 2 fails on stock
        let items = [CartItem { product_id: p.id, quantity: 2 }];
        let err = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: p.id,
                requested: 2,
                available: 1
            }
        );

        // quantity 1 succeeds with an exact total
        let items = [CartItem { product_id: p.id, quantity: 1 }];
        let outcome = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap();
        assert_eq!(outcome.total.value(), dec!(12.50));
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].line_total.value(), dec!(12.50));
    }

    #[test]
    fn test_insufficient_funds_considers_credit_line() {
        let w = wallet(dec!(5.00), dec!(5.00), dec!(0));
        let p = product(&w, dec!(12.50), 5);
        let items = [CartItem { product_id: p.id, quantity: 1 }];
        let err = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientFunds {
                required: dec!(12.50),
                available: dec!(10.00)
            }
        );

        // 10.00 of credit-backed funds cover a 10.00 order exactly
        let p2 = product(&w, dec!(10.00), 5);
        let items = [CartItem { product_id: p2.id, quantity: 1 }];
        assert!(validate_order(&w, &[p2], &items, Money::zero()).is_ok());
    }

    #[test]
    fn test_spec_example_daily_limit() {
        // limit 10.00, spent today 8.00, new total 3.00 -> rejected
        let w = wallet(dec!(100.00), dec!(0), dec!(10.00));
        let p = product(&w, dec!(3.00), 10);
        let items = [CartItem { product_id: p.id, quantity: 1 }];
        let err = validate_order(&w, &[p.clone()], &items, money(dec!(8.00))).unwrap_err();
        assert_eq!(
            err,
            DomainError::DailyLimitExceeded {
                limit: dec!(10.00),
                spent_today: dec!(8.00),
                attempted: dec!(3.00)
            }
        );

        // exactly reaching the limit is allowed
        let items = [CartItem { product_id: p.id, quantity: 1 }];
        assert!(validate_order(&w, &[p], &items, money(dec!(7.00))).is_ok());
    }

    #[test]
    fn test_zero_daily_limit_means_unlimited() {
        let w = wallet(dec!(100.00), dec!(0), dec!(0));
        let p = product(&w, dec!(30.00), 10);
        let items = [CartItem { product_id: p.id, quantity: 3 }];
        let outcome = validate_order(&w, &[p], &items, money(dec!(500.00))).unwrap();
        assert_eq!(outcome.total.value(), dec!(90.00));
    }

    #[test]
    fn test_duplicate_product_lines_sum() {
        let w = wallet(dec!(100.00), dec!(0), dec!(0));
        let p = product(&w, dec!(2.50), 10);
        let items = [
            CartItem { product_id: p.id, quantity: 2 },
            CartItem { product_id: p.id, quantity: 1 },
        ];
        let outcome = validate_order(&w, &[p.clone()], &items, Money::zero()).unwrap();
        assert_eq!(outcome.total.value(), dec!(7.50));
        assert_eq!(referenced_product_ids(&items), vec![p.id]);
    }
}
