//! Discord command implementations organized by category.

/// Commands sending stored components
pub mod demo;

/// General utility commands
pub mod general;

// Export commands
pub use demo::*;
pub use general::*;
