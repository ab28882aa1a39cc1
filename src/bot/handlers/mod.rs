//! Discord interaction handlers
//!
//! This module provides the persistent handlers that stored buttons, select menus and
//! timeouts are bound to by name.

/// Handlers of the demo commands' components
pub mod buttons;
