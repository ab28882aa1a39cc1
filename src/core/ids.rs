//! Component identity codec.
//!
//! Components are identified by an internal integer id, and by a wire id embedded in the
//! `custom_id` of the Discord UI element. The wire id is the internal id prefixed with
//! [`PREFIX`], which lets the listener ignore components created by anything else.

use crate::errors::{Error, Result};

/// Prefix of every wire id created by this crate.
pub const PREFIX: &str = "ComponentBuddy-";

/// Encodes an internal component id into the `custom_id` of a UI element.
#[must_use]
pub fn encode(internal_id: i32) -> String {
    format!("{PREFIX}{internal_id}")
}

/// Whether the `custom_id` was created by [`encode`].
#[must_use]
pub fn is_compatible(wire_id: &str) -> bool {
    wire_id.starts_with(PREFIX)
}

/// Decodes the internal id of a wire id.
///
/// Callers must check [`is_compatible`] first, a malformed suffix can only come from a
/// forged or corrupted id and is reported as an internal error.
pub fn decode(wire_id: &str) -> Result<i32> {
    wire_id
        .strip_prefix(PREFIX)
        .and_then(|suffix| suffix.parse().ok())
        .ok_or_else(|| Error::internal(format!("Malformed component id: '{wire_id}'")))
}
