//! Redemption QR payloads
//!
//! A customer's app renders the encoded payload as a QR code; the business
//! scans it and submits the decoded string with the redeem request, where
//! it is recorded on the transaction row. Image rendering is a client
//! concern, only the payload format lives here.

use crate::error::{Error, Result};
use crate::types::{Scope, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Data encoded into a redemption QR code
///
/// The payload binds the scope it was generated for; a code minted against
/// one pool cannot be replayed against another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionPayload {
    /// User presenting the code
    pub user_id: UserId,
    /// Balance scope the code debits
    pub scope: Scope,
    /// Points the code authorizes
    pub points_amount: Decimal,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl RedemptionPayload {
    /// Build a payload stamped with the current time
    pub fn new(user_id: UserId, scope: Scope, points_amount: Decimal) -> Self {
        Self {
            user_id,
            scope,
            points_amount,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Encode as the JSON string carried inside the QR code
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Validation(format!("failed to encode QR payload: {e}")))
    }

    /// Decode a scanned payload
    pub fn decode(data: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(data)
            .map_err(|e| Error::Validation(format!("invalid QR payload: {e}")))?;
        if payload.points_amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "QR payload points_amount must be positive".to_string(),
            ));
        }
        Ok(payload)
    }

    /// Whether the payload is older than `max_age_ms`
    pub fn is_expired(&self, max_age_ms: i64) -> bool {
        chrono::Utc::now().timestamp_millis() - self.timestamp > max_age_ms
    }
}
