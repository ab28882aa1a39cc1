//! General Discord commands - ping, help, and other utility commands.
//! This module contains simple commands that don't touch stored components.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**ComponentBuddy Help**\n\
        Buttons and menus sent by this bot keep working after it restarts.\n\n\
        **Component Commands**\n\
        • `/greet <count>` - Sends a button the first clicker gets greeted by.\n\
        • `/color` - Sends a menu to pick your favorite colors.\n\
        • `/confirm <action>` - Asks you to confirm an action within a minute.\n\n\
        **Utility Commands**\n\
        • `/ping` - Checks if the bot is responsive.\n\
        • `/help` - Shows this help message.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
