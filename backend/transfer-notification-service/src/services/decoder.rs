use crate::error::DecodeError;
use crate::models::Notification;

/// Decode a raw broker payload into a [`Notification`]
///
/// Either all four fields are populated or the call fails; there is no
/// partially filled result.
pub fn decode(payload: &[u8]) -> Result<Notification, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(serde_json::from_slice(payload)?)
}
