//! Request payload parsing.
//!
//! Handlers take the raw body and run it through `parse_body` before
//! touching identity or storage, so a malformed request never gets past
//! the first step.

use serde::de::DeserializeOwned;
use tracing::debug;
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::voice::is_valid_chat_id;

/// Generic message for any payload that fails to parse or validate.
pub const INVALID_DATA_MESSAGE: &str = "Invalid data";

/// Deserializes a JSON body and applies its `validator` rules.
pub fn parse_body<T>(body: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    let payload: T = serde_json::from_slice(body).map_err(|e| {
        debug!("Rejected payload: {e}");
        AppError::Validation(INVALID_DATA_MESSAGE.to_string())
    })?;

    payload.validate().map_err(|e| {
        debug!("Rejected payload: {e}");
        AppError::Validation(INVALID_DATA_MESSAGE.to_string())
    })?;

    Ok(payload)
}

/// Rejects blank strings that `length(min = 1)` would let through.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// An id the voice provider could have issued; it ends up in a request path.
pub fn chat_id(value: &str) -> Result<(), ValidationError> {
    if is_valid_chat_id(value.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("chat_id"))
    }
}

/// `HH:MM:SS` with minutes and seconds below 60.
pub fn hh_mm_ss(value: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = value.split(':').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit()))
        && parts[1] < "60"
        && parts[2] < "60";

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("duration"))
    }
}
