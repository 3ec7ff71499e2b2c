//! PIX payment gateway client
//!
//! Outbound integration with the Asaas API for creating dynamic PIX
//! charges. The trait keeps handlers testable without network access;
//! the production implementation speaks HTTPS via reqwest.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::Money;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A PIX charge created at the gateway.
#[derive(Debug, Clone)]
pub struct PixCharge {
    /// Gateway payment id, later echoed by the confirmation webhook
    pub payment_id: String,
    /// Copy-and-paste PIX payload the payer scans
    pub qr_code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Creates charges at an external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_pix_charge(
        &self,
        customer_name: &str,
        external_ref: Uuid,
        amount: Money,
        description: &str,
    ) -> Result<PixCharge, GatewayError>;
}

// ============================================================================
// Asaas implementation
// ============================================================================

#[derive(Serialize)]
struct CustomerRequest<'a> {
    name: &'a str,
    #[serde(rename = "externalReference")]
    external_reference: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Serialize)]
struct ChargeRequest<'a> {
    customer: &'a str,
    #[serde(rename = "billingType")]
    billing_type: &'static str,
    value: Decimal,
    #[serde(rename = "dueDate")]
    due_date: String,
    description: &'a str,
}

#[derive(Deserialize)]
struct ChargeResponse {
    id: String,
}

#[derive(Deserialize)]
struct QrCodeResponse {
    payload: String,
}

/// Asaas REST client. Three calls per charge: register the customer,
/// create the PIX payment, fetch its QR code payload.
pub struct AsaasGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AsaasGateway {
    pub fn new(base_url: String, api_key: String) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("access_token", &self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R, GatewayError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("access_token", &self.api_key)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for AsaasGateway {
    async fn create_pix_charge(
        &self,
        customer_name: &str,
        external_ref: Uuid,
        amount: Money,
        description: &str,
    ) -> Result<PixCharge, GatewayError> {
        let customer: CustomerResponse = self
            .post(
                "/customers",
                &CustomerRequest {
                    name: customer_name,
                    external_reference: external_ref.to_string(),
                },
            )
            .await?;

        let charge: ChargeResponse = self
            .post(
                "/payments",
                &ChargeRequest {
                    customer: &customer.id,
                    billing_type: "PIX",
                    value: amount.value(),
                    due_date: chrono::Utc::now().date_naive().to_string(),
                    description,
                },
            )
            .await?;

        let qr: QrCodeResponse = self
            .get(&format!("/payments/{}/pixQrCode", charge.id))
            .await?;

        tracing::info!(payment_id = %charge.id, %amount, "PIX charge created");

        Ok(PixCharge {
            payment_id: charge.id,
            qr_code: qr.payload,
        })
    }
}
