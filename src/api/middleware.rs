//! API Middleware
//!
//! Caller identity extraction and role checks.
//!
//! Authentication itself happens upstream at the API gateway; this
//! service trusts the identity headers it forwards: `X-Role`,
//! `X-User-Id` and `X-Tenant-Id`.

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;

/// Caller role forwarded by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Superadmin,
    Merchant,
    Sponsor,
    Consumer,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "SUPERADMIN" => Some(Role::Superadmin),
            "MERCHANT" => Some(Role::Merchant),
            "SPONSOR" => Some(Role::Sponsor),
            "CONSUMER" => Some(Role::Consumer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "SUPERADMIN",
            Role::Merchant => "MERCHANT",
            Role::Sponsor => "SPONSOR",
            Role::Consumer => "CONSUMER",
        }
    }
}

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone)]
pub struct Identity {
    pub role: Role,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

impl Identity {
    /// Superadmin passes every check; other roles must be listed.
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if self.role == Role::Superadmin || allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} cannot access this resource",
                self.role.as_str()
            )))
        }
    }
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code,
        })),
    )
        .into_response()
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, Response> {
    let raw = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                &format!("Missing {} header", name),
                "missing_identity_header",
            )
        })?;
    Uuid::parse_str(raw).map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            &format!("Invalid {} header format", name),
            "invalid_identity_header",
        )
    })
}

/// Extract the caller identity from the forwarded headers
pub async fn identity_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let role = match headers.get("X-Role").and_then(|v| v.to_str().ok()) {
        Some(raw) => Role::parse(raw).ok_or_else(|| {
            reject(
                StatusCode::FORBIDDEN,
                "Unknown role",
                "unknown_role",
            )
        })?,
        None => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-Role header",
                "missing_identity_header",
            ));
        }
    };

    let user_id = header_uuid(&headers, "X-User-Id")?;
    let tenant_id = header_uuid(&headers, "X-Tenant-Id")?;

    request.extensions_mut().insert(Identity {
        role,
        user_id,
        tenant_id,
    });

    Ok(next.run(request).await)
}
