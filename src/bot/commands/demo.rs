//! Component demo commands - greet, color and confirm.
//!
//! Each command shows one way of using stored components: a persistent button bound to a
//! named handler, a persistent select menu, and ephemeral buttons awaited by the command.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, components, handlers::buttons},
        core::data::{
            ComponentBuilder, ComponentGroupBuilder, ComponentTimeout, EphemeralTimeout,
            InteractionConstraints,
        },
        errors::{Error, Result},
    };
    use chrono::Utc;
    use poise::serenity_prelude as serenity;
    use std::time::Duration;
    use tracing::debug;

    /// How long a confirmation stays answerable.
    const CONFIRM_SECONDS: u64 = 60;

    /// Sends a button the first clicker gets greeted by.
    ///
    /// The button survives restarts and expires after a day.
    #[poise::command(slash_command, prefix_command)]
    pub async fn greet(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Number of this greeting"] count: i64,
    ) -> Result<()> {
        let builder = ComponentBuilder::persistent_button()
            .one_use(true)
            .bind_to(buttons::GREET_BUTTON, [count])
            .persistent_timeout(
                Utc::now() + chrono::Duration::days(1),
                Some(buttons::GREET_EXPIRED),
                [count],
            );
        let (component_id, button) = components::create_button(
            &ctx.data().components,
            &builder,
            "Greet me",
            serenity::ButtonStyle::Primary,
        )
        .await?;
        debug!("Greeting #{count} is component {component_id}");

        ctx.send(
            poise::CreateReply::default()
                .content(format!("👋 Greeting #{count} is up for grabs!"))
                .components(vec![serenity::CreateActionRow::Buttons(vec![button])]),
        )
        .await?;
        Ok(())
    }

    /// Sends a select menu echoing the picked colors.
    #[poise::command(slash_command, prefix_command)]
    pub async fn color(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let options = ["Red", "Green", "Blue"]
            .into_iter()
            .map(|color| (color.to_string(), color.to_lowercase()))
            .collect();
        let (_, menu) = components::create_string_select(
            &ctx.data().components,
            &ComponentBuilder::persistent_select_menu()
                .bind_to(buttons::PICK_COLOR_MENU, Vec::<String>::new()),
            "Pick your favorite colors",
            options,
        )
        .await?;

        ctx.send(
            poise::CreateReply::default()
                .content("🎨 What are your favorite colors?")
                .components(vec![serenity::CreateActionRow::SelectMenu(menu)]),
        )
        .await?;
        Ok(())
    }

    /// Asks the caller to confirm an action, then waits for the answer.
    ///
    /// Only the caller may answer. Both buttons are removed after the first answer or
    /// once the confirmation expires.
    #[poise::command(slash_command, prefix_command)]
    pub async fn confirm(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "What to confirm"] action: String,
    ) -> Result<()> {
        let controller = &ctx.data().components;
        let only_caller = InteractionConstraints::default().allow_user(ctx.author().id.get());

        let (yes_id, yes) = components::create_button(
            controller,
            &ComponentBuilder::ephemeral_button().constraints(only_caller.clone()),
            "Confirm",
            serenity::ButtonStyle::Success,
        )
        .await?;
        let (no_id, no) = components::create_button(
            controller,
            &ComponentBuilder::ephemeral_button().constraints(only_caller),
            "Cancel",
            serenity::ButtonStyle::Danger,
        )
        .await?;

        #[allow(clippy::cast_possible_wrap)]
        let expiration = Utc::now() + chrono::Duration::seconds(CONFIRM_SECONDS as i64);
        let group = controller
            .create_group(
                &ComponentGroupBuilder::ephemeral([yes_id, no_id])
                    .one_use(true)
                    .timeout(ComponentTimeout::Ephemeral(EphemeralTimeout {
                        expiration,
                        handler: None,
                    })),
            )
            .await?;

        ctx.send(
            poise::CreateReply::default()
                .content(format!("❓ Really {action}?"))
                .components(vec![serenity::CreateActionRow::Buttons(vec![yes, no])]),
        )
        .await?;

        match group
            .await_any_timeout(Duration::from_secs(CONFIRM_SECONDS))
            .await
        {
            Ok(event) if event.component_id() == yes_id => {
                event.reply_ephemeral(&format!("✅ Confirmed: {action}")).await?;
            }
            Ok(event) => {
                event.reply_ephemeral("❌ Cancelled.").await?;
            }
            Err(Error::AwaitTimeout { .. }) => {
                group.delete().await?;
                ctx.say("⌛ Nobody answered in time.").await?;
            }
            Err(Error::ComponentDeleted { .. }) => {
                ctx.say("⌛ This confirmation expired.").await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
