use chrono::{DateTime, Utc};
use mongodb::bson;
use serde::{Deserialize, Serialize};

/// A large transfer event, as produced by the transaction system
///
/// Every field is required on the wire. A payload missing any of them, or
/// carrying one with the wrong type, never becomes a `Notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Account the transfer belongs to
    pub user_id: i64,
    pub amount: f64,
    /// ISO-style currency code, e.g. "USD"
    pub currency: String,
    /// When the transfer happened (producer clock, RFC3339 on the wire)
    pub timestamp: DateTime<Utc>,
}

/// Document stored in the `transfers` collection
///
/// Same field names as the wire payload. The timestamp is kept as a native
/// BSON datetime, which has millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferNotificationDocument {
    pub user_id: i64,
    pub amount: f64,
    pub currency: String,
    pub timestamp: bson::DateTime,
}

impl From<&Notification> for TransferNotificationDocument {
    fn from(notification: &Notification) -> Self {
        Self {
            user_id: notification.user_id,
            amount: notification.amount,
            currency: notification.currency.clone(),
            timestamp: bson::DateTime::from_millis(notification.timestamp.timestamp_millis()),
        }
    }
}
