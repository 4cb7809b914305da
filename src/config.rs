//!
//! Loading clock options from configuration text.
//!
//! Every clock's `Options` type derives `serde::Deserialize` with `#[serde(default)]`,
//! so a config only names the fields it wants to pin; node ids are written as UUID
//! strings.

use crate::clock_traits::Clock;
use crate::error::ClockError;
use serde::de::DeserializeOwned;

/// Parses options from a JSON document.
pub fn options_from_json<T: DeserializeOwned>(json: &str) -> Result<T, ClockError> {
    serde_json::from_str(json).map_err(|e| {
        tracing::warn!("Rejecting clock options: {}", e);
        ClockError::InvalidInput(format!("Invalid clock options: {}", e))
    })
}

/// Parses options from JSON and sets the clock up in one go.
pub fn clock_from_json<C>(json: &str) -> Result<C, ClockError>
where
    C: Clock,
    C::Options: DeserializeOwned,
{
    C::setup(options_from_json(json)?)
}
