//! Records owned by the store layer.
//!
//! Orders and products are defined in the `domain` crate; the records here
//! exist only to support the consistency machinery.

use chrono::{DateTime, Utc};
use common::{ProductId, WarehouseId};
use serde::{Deserialize, Serialize};

/// Stock level for one product at one warehouse.
///
/// `reserved` defaults to 0 on deserialization: rows written before the
/// reservation machinery existed lack the attribute, and the read path
/// backfills it (schema-evolution accommodation, not a correctness
/// feature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Units physically on hand.
    pub quantity: u32,
    /// Units allocated to open orders. Always `<= quantity`.
    #[serde(default)]
    pub reserved: u32,
    /// Strictly increases by 1 on every successful write.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    /// Units available for new reservations.
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved)
    }
}

/// Execution state of an idempotency row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::InProgress => "IN_PROGRESS",
            IdempotencyStatus::Completed => "COMPLETED",
            IdempotencyStatus::Failed => "FAILED",
        }
    }
}

/// One gated execution, keyed by a stable fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// Human-readable operation label, for diagnostics.
    pub operation: String,
    pub status: IdempotencyStatus,
    /// Serialized result of the first completed execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Epoch seconds; rows past this instant read as absent.
    pub expires_at: i64,
}

impl IdempotencyRecord {
    /// Returns true if the row has passed its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Admin session consulted by the authorizer gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    /// Epoch seconds; expired sessions read as absent.
    pub expires_at: i64,
}
