use poise::serenity_prelude as serenity;
use tracing::info;

use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    ctx.send(poise::CreateReply::default()
        .content("Pong! Bot is working!")
        .ephemeral(true))
        .await?;
    Ok(())
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let embed = serenity::CreateEmbed::new()
        .title("Bot Commands")
        .description("Available commands:")
        .field("/ping", "Check if the bot is running", false)
        .field("/backup create", "Back up this server, optionally leaving out bans, roles, channels or emojis (Admin)", false)
        .field("/backup load", "Restore a backup into this server, clearing it first by default (Admin)", false)
        .field("/backup info", "Show what one of this server's backups contains (Admin)", false)
        .field("/backup list", "List this server's backups (Admin)", false)
        .field("/backup remove", "Delete one of this server's backups (Admin)", false)
        .field("/backup upload", "Store a backup .json file (Admin)", false)
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}
