//! Payment Reconciler
//!
//! Consumes asynchronous gateway confirmations and credits wallets
//! exactly once per external payment id. Gateways redeliver webhooks
//! freely, so a duplicate is a success to acknowledge, never an error;
//! the store-level recharge commit is the single exactly-once guard,
//! making concurrent duplicate deliveries safe as well.

use std::sync::Arc;

use crate::domain::{
    DomainError, LedgerEntry, Money, PaymentIntentStatus, PaymentMethod,
};
use crate::store::{CoreStore, PaymentIntentStore, RechargeCommit, StoreError};

/// Gateway status that triggers crediting. Anything else is ignored
/// without mutation.
const SUCCESS_STATUS: &str = "RECEIVED";

/// Outcome of processing one gateway notification
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The wallet was credited by this delivery
    Credited { wallet_id: uuid::Uuid, amount: Money },
    /// Duplicate delivery or non-success status; nothing was mutated
    Ignored,
}

impl Reconciliation {
    pub fn credited(&self) -> bool {
        matches!(self, Reconciliation::Credited { .. })
    }
}

/// Failures surfaced by reconciliation
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies gateway payment confirmations to wallets.
pub struct PaymentReconciler {
    store: Arc<dyn CoreStore>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn CoreStore>) -> Self {
        Self { store }
    }

    /// Reconcile one gateway notification.
    ///
    /// The credited amount is always the gateway-confirmed one, never a
    /// client-supplied value. The intent's registered amount is only
    /// logged when they disagree.
    pub async fn reconcile(
        &self,
        external_id: &str,
        confirmed_amount: Money,
        confirmed_status: &str,
    ) -> Result<Reconciliation, ReconcileError> {
        let intent = self
            .store
            .intent_by_external_id(external_id)
            .await?
            .ok_or_else(|| DomainError::UnknownPayment(external_id.to_string()))?;

        if intent.status == PaymentIntentStatus::Received {
            tracing::debug!(%external_id, "duplicate payment delivery ignored");
            return Ok(Reconciliation::Ignored);
        }

        if confirmed_status != SUCCESS_STATUS {
            tracing::debug!(%external_id, status = confirmed_status, "non-success payment status ignored");
            return Ok(Reconciliation::Ignored);
        }

        if confirmed_amount != intent.amount {
            tracing::warn!(
                %external_id,
                confirmed = %confirmed_amount,
                registered = %intent.amount,
                "gateway-confirmed amount differs from registered intent, crediting confirmed amount"
            );
        }

        let commit = RechargeCommit {
            external_id: external_id.to_string(),
            wallet_id: intent.wallet_id,
            amount: confirmed_amount,
            ledger_entry: LedgerEntry::credit(
                intent.wallet_id,
                confirmed_amount,
                PaymentMethod::Pix,
                format!("PIX recharge {external_id}"),
            ),
        };

        if self.store.commit_recharge(commit).await? {
            tracing::info!(%external_id, wallet_id = %intent.wallet_id, amount = %confirmed_amount, "payment reconciled");
            Ok(Reconciliation::Credited {
                wallet_id: intent.wallet_id,
                amount: confirmed_amount,
            })
        } else {
            // Lost a race against a concurrent delivery of the same id.
            Ok(Reconciliation::Ignored)
        }
    }
}
