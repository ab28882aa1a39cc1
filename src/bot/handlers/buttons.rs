//! Persistent handlers of the demo commands.
//!
//! Stored components refer to these by name, so renaming one breaks every component
//! already sent with the old name.

use crate::core::handlers::{HandlerOption, HandlerRegistry, OptionKind};
use crate::errors::Result;
use tracing::info;

/// Button greeting whoever clicks it. Takes the greeting number.
pub const GREET_BUTTON: &str = "greet";

/// Select menu echoing the picked colors.
pub const PICK_COLOR_MENU: &str = "pick_color";

/// Timeout of greet buttons nobody clicked. Takes the greeting number.
pub const GREET_EXPIRED: &str = "greet_expired";

/// Builds the registry with every handler of the bot.
pub fn register_handlers() -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::default();

    registry.register_button(
        GREET_BUTTON,
        vec![HandlerOption::required("count", OptionKind::Integer)],
        |event, args| async move {
            let count = args.integer(0).unwrap_or_default();
            event
                .reply_ephemeral(&format!(
                    "Hello <@{}>! You claimed greeting #{count}.",
                    event.user_id()
                ))
                .await
        },
    )?;

    registry.register_select_menu(PICK_COLOR_MENU, vec![], |event, _| async move {
        let values = event.values();
        let content = if values.is_empty() {
            "You did not pick anything.".to_string()
        } else {
            format!("You picked: {}", values.join(", "))
        };
        event.reply_ephemeral(&content).await
    })?;

    registry.register_timeout(
        GREET_EXPIRED,
        vec![HandlerOption::required("count", OptionKind::Integer)],
        |event, args| async move {
            info!(
                "Greeting #{} expired unclaimed (component {})",
                args.integer(0).unwrap_or_default(),
                event.component_id
            );
            Ok(())
        },
    )?;

    Ok(registry)
}
