//! Discord UI elements backed by stored components.
//!
//! The component is created first, then the button or select menu is built from its wire
//! id.

use crate::core::controller::ComponentController;
use crate::core::data::ComponentBuilder;
use crate::errors::{Error, Result};
use poise::serenity_prelude as serenity;

/// Creates the component described by `builder` and a button pointing at it.
///
/// Returns the internal component id with the button.
pub async fn create_button(
    controller: &ComponentController,
    builder: &ComponentBuilder,
    label: &str,
    style: serenity::ButtonStyle,
) -> Result<(i32, serenity::CreateButton)> {
    controller
        .with_new_component(builder, |component_id, custom_id| {
            let button = serenity::CreateButton::new(custom_id).label(label).style(style);
            (component_id, button)
        })
        .await
}

/// Creates the component described by `builder` and a string select menu pointing at it.
pub async fn create_string_select(
    controller: &ComponentController,
    builder: &ComponentBuilder,
    placeholder: &str,
    options: Vec<(String, String)>,
) -> Result<(i32, serenity::CreateSelectMenu)> {
    if options.is_empty() || options.len() > 25 {
        return Err(Error::user("A select menu needs between 1 and 25 options"));
    }

    let options = options
        .into_iter()
        .map(|(label, value)| serenity::CreateSelectMenuOption::new(label, value))
        .collect();
    controller
        .with_new_component(builder, |component_id, custom_id| {
            let menu = serenity::CreateSelectMenu::new(
                custom_id,
                serenity::CreateSelectMenuKind::String { options },
            )
            .placeholder(placeholder);
            (component_id, menu)
        })
        .await
}
