use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::backup::{create_backup, flush_guild, load_backup, CreateOptions, LoadOptions, Section};
use crate::error::BackupError;
use crate::managers::BackupManager;
use crate::platform::{GuildHandle, SerenityGuild};
use crate::{Context, Error};

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

fn guild_id(ctx: &Context<'_>) -> Result<serenity::GuildId, BackupError> {
    ctx.guild_id().ok_or_else(|| BackupError::GuildNotFound {
        id: "direct message".to_string(),
    })
}

fn guild_handle(ctx: &Context<'_>) -> Result<SerenityGuild, BackupError> {
    Ok(SerenityGuild::new(ctx.serenity_context().http.clone(), guild_id(ctx)?))
}

async fn reply(ctx: &Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default()
        .content(content)
        .ephemeral(true))
        .await?;
    Ok(())
}

/// Back up and restore this server
#[poise::command(
    slash_command,
    guild_only,
    default_member_permissions = "ADMINISTRATOR",
    subcommands("create", "load", "info", "list", "remove", "upload"),
    subcommand_required
)]
pub async fn backup(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a backup of this server
#[poise::command(slash_command, guild_only)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Sections to leave out, e.g. \"bans, emojis\""]
    exclude: Option<String>,
    #[description = "Use this id instead of a generated one"]
    custom_id: Option<String>,
) -> Result<(), Error> {
    let exclude = match exclude.as_deref().map(Section::parse_list).transpose() {
        Ok(sections) => sections.unwrap_or_default(),
        Err(e) => return reply(&ctx, e.to_string()).await,
    };

    let guild = guild_handle(&ctx)?;
    let manager = &ctx.data().backup_manager;

    // Checked up front so a bad id does not cost a full export
    if let Some(id) = &custom_id {
        if let Err(e) = BackupManager::validate_id(id) {
            return reply(&ctx, e.to_string()).await;
        }
        if manager.owner_of(id).await?.is_some_and(|owner| owner != guild.id()) {
            return reply(&ctx, format!("The id `{}` is already used by another server.", id)).await;
        }
    }

    ctx.defer_ephemeral().await?;
    let options = CreateOptions { custom_id, exclude };

    let snapshot = create_backup(&guild, &options).await?;
    manager.save(guild.id(), &snapshot).await?;

    let content = serde_json::to_vec_pretty(&snapshot)?;
    let attachment = serenity::CreateAttachment::bytes(content, format!("{}.json", snapshot.id));

    let embed = serenity::CreateEmbed::new()
        .title("Backup created")
        .description(format!(
            "**Id:** `{}`\n**Contents:** {} roles, {} channels, {} emojis, {} bans\n\n\
             Restore it with `/backup load {}`.",
            snapshot.id,
            snapshot.roles.len(),
            snapshot.channel_count(),
            snapshot.emojis.len(),
            snapshot.bans.len(),
            snapshot.id
        ))
        .color(0x2ecc71);

    ctx.send(poise::CreateReply::default()
        .embed(embed)
        .attachment(attachment)
        .ephemeral(true))
        .await?;

    info!("Backup {} created by {}", snapshot.id, ctx.author().name);
    Ok(())
}

/// Load a backup into this server
#[poise::command(slash_command, guild_only)]
pub async fn load(
    ctx: Context<'_>,
    #[description = "Backup id"]
    id: String,
    #[description = "Delete everything in the server first (default: yes)"]
    flush: Option<bool>,
) -> Result<(), Error> {
    let guild = guild_handle(&ctx)?;
    let manager = ctx.data().backup_manager.clone();
    let snapshot = manager.fetch(&id).await?;
    let flush = flush.unwrap_or(true);

    if manager.import_running(guild.id()) {
        return reply(&ctx, "A backup is already being loaded into this server.").await;
    }

    let warning = if flush {
        "**Every role, channel, emoji, ban and webhook in this server will be deleted first.**"
    } else {
        "Existing roles and channels are kept; the backup is added on top."
    };
    let embed = serenity::CreateEmbed::new()
        .title(format!("Load backup `{}`?", snapshot.id))
        .description(format!(
            "**Server:** {}\n**Contents:** {} roles, {} channels, {} emojis, {} bans\n\n{}\n\n\
             Buttons expire after 60 seconds.",
            snapshot.name,
            snapshot.roles.len(),
            snapshot.channel_count(),
            snapshot.emojis.len(),
            snapshot.bans.len(),
            warning
        ))
        .color(0xe67e22);

    let confirm_id = format!("{}-confirm", ctx.id());
    let cancel_id = format!("{}-cancel", ctx.id());
    let buttons = vec![
        serenity::CreateButton::new(confirm_id.clone())
            .label("Load backup")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new(cancel_id)
            .label("Cancel")
            .style(serenity::ButtonStyle::Secondary),
    ];

    let reply_handle = ctx.send(poise::CreateReply::default()
        .embed(embed)
        .components(vec![serenity::CreateActionRow::Buttons(buttons)])
        .ephemeral(true))
        .await?;
    let message = reply_handle.message().await?;

    let Some(interaction) = message
        .await_component_interaction(ctx.serenity_context().shard.clone())
        .author_id(ctx.author().id)
        .timeout(CONFIRM_TIMEOUT)
        .await
    else {
        info!("Load of backup {} timed out for {}", id, ctx.author().name);
        return Ok(());
    };

    if interaction.data.custom_id != confirm_id {
        interaction.create_response(
            ctx.http(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content("Cancelled.")
                    .embeds(vec![])
                    .components(vec![])
            )
        ).await?;
        return Ok(());
    }

    interaction.create_response(
        ctx.http(),
        serenity::CreateInteractionResponse::UpdateMessage(
            serenity::CreateInteractionResponseMessage::new()
                .content(format!("Loading backup `{}`...", snapshot.id))
                .embeds(vec![])
                .components(vec![])
        )
    ).await?;

    let _guard = manager.begin_import(guild.id(), &id)?;
    info!("{} is loading backup {} into guild {}", ctx.author().name, id, guild.id());

    let mut report = Vec::new();
    if flush {
        let summary = flush_guild(&guild).await;
        report.push(summary.format());
    }

    // Flushing is done above so its summary can be reported
    match load_backup(&guild, &snapshot, &LoadOptions { flush_guild: false }).await {
        Ok(loaded) => report.push(format!("Backup `{}` loaded.", loaded.id)),
        Err(e) => {
            error!("Failed to load backup {}: {}", id, e);
            report.push(format!("Loading backup `{}` failed: {}", id, e));
        }
    }

    // The invoking channel may be gone after a flush
    let content = report.join("\n\n");
    if let Err(e) = interaction.create_followup(
        ctx.http(),
        serenity::CreateInteractionResponseFollowup::new()
            .content(content.clone())
            .ephemeral(true)
    ).await {
        warn!("Could not send load report as followup ({}), sending a DM", e);
        ctx.author()
            .direct_message(ctx.http(), serenity::CreateMessage::new().content(content))
            .await?;
    }

    Ok(())
}

/// Show details about one of this server's backups
#[poise::command(slash_command, guild_only)]
pub async fn info(
    ctx: Context<'_>,
    #[description = "Backup id"]
    id: String,
) -> Result<(), Error> {
    let details = ctx.data().backup_manager.info(guild_id(&ctx)?, &id).await?;

    let embed = serenity::CreateEmbed::new()
        .title("Backup details")
        .description(details.format())
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}

/// List this server's backups
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let backups = ctx.data().backup_manager.list(guild_id(&ctx)?).await?;
    if backups.is_empty() {
        return reply(&ctx, "No backups stored yet.").await;
    }

    let max = ctx.data().config.max_list;
    let mut lines: Vec<String> = backups
        .iter()
        .take(max)
        .map(|b| {
            let created =
                chrono::DateTime::<chrono::Utc>::from_timestamp_millis(b.created_timestamp)
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "?".to_string());
            format!("`{}` - {} ({})", b.id, b.name, created)
        })
        .collect();
    if backups.len() > max {
        lines.push(format!("...and {} more", backups.len() - max));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("Backups ({})", backups.len()))
        .description(lines.join("\n"))
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true)).await?;
    Ok(())
}

/// Delete one of this server's backups
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Backup id"]
    id: String,
) -> Result<(), Error> {
    ctx.data().backup_manager.remove(guild_id(&ctx)?, &id).await?;
    info!("Backup {} removed by {}", id, ctx.author().name);
    reply(&ctx, format!("Backup `{}` removed.", id)).await
}

/// Store a backup file exported elsewhere
#[poise::command(slash_command, guild_only)]
pub async fn upload(
    ctx: Context<'_>,
    #[description = "The backup .json file"]
    file: serenity::Attachment,
) -> Result<(), Error> {
    info!("upload called by {} with file {}", ctx.author().name, file.filename);

    if !file.filename.ends_with(".json") {
        return reply(&ctx, "Please upload a `.json` file.").await;
    }

    let content = match file.download().await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to download attachment: {}", e);
            return reply(&ctx, format!("Failed to download file: {}", e)).await;
        }
    };

    let snapshot = match BackupManager::parse(&content, &file.filename) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Rejected uploaded backup {}: {}", file.filename, e);
            return reply(&ctx, format!("That file is not a valid backup: {}", e)).await;
        }
    };

    let manager = &ctx.data().backup_manager;
    if manager.owner_of(&snapshot.id).await?.is_some() {
        return reply(&ctx, format!(
            "A backup with id `{}` already exists. Remove it first.",
            snapshot.id
        )).await;
    }

    manager.save(guild_id(&ctx)?, &snapshot).await?;
    reply(&ctx, format!(
        "Stored backup `{}` of **{}**. Load it with `/backup load {}`.",
        snapshot.id, snapshot.name, snapshot.id
    )).await
}
