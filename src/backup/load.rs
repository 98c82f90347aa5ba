use futures::future::{join_all, try_join_all};
use poise::serenity_prelude::{
    ChannelId, ChannelType, DefaultMessageNotificationLevel, ExplicitContentFilter, Permissions,
    UserId, VerificationLevel,
};
use tracing::{debug, info, warn};

use super::{flush, permissions};
use crate::error::Result;
use crate::platform::{
    GuildHandle, GuildInfo, GuildSetting, NewChannel, NewRole, NewThread, RoleInfo,
};
use crate::snapshot::{
    parse_bits, parse_colour, parse_snowflake, ChannelRecord, RoleRecord, Snapshot, ThreadRecord,
};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Clear the guild before replaying the snapshot
    pub flush_guild: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { flush_guild: true }
    }
}

/// Replay a snapshot onto a guild.
///
/// Phases run one after another because later phases look up what earlier
/// ones created by name. Apart from the core settings, the first failure in a
/// phase stops the import.
pub async fn load_backup<'a>(
    guild: &dyn GuildHandle,
    snapshot: &'a Snapshot,
    options: &LoadOptions,
) -> Result<&'a Snapshot> {
    snapshot.validate()?;
    info!("Loading backup {} into guild {}", snapshot.id, guild.id());

    if options.flush_guild {
        let summary = flush::flush_guild(guild).await;
        debug!("Flush summary:\n{}", summary.format());
    }

    let target = guild.info().await?;

    load_config(guild, snapshot, &target).await;
    load_roles(guild, snapshot).await?;
    load_channels(guild, snapshot, &target).await?;
    load_afk(guild, snapshot).await?;
    load_emojis(guild, snapshot).await?;
    load_bans(guild, snapshot).await?;
    load_widget(guild, snapshot).await?;

    info!("Backup {} loaded into guild {}", snapshot.id, guild.id());
    Ok(snapshot)
}

async fn load_config(guild: &dyn GuildHandle, snapshot: &Snapshot, target: &GuildInfo) {
    let mut settings = vec![GuildSetting::Name(snapshot.name.clone())];

    if let Some(url) = &snapshot.icon_url {
        settings.push(GuildSetting::Icon(Some(url.clone())));
    }
    if let Some(url) = &snapshot.splash_url {
        settings.push(GuildSetting::Splash(Some(url.clone())));
    }
    if let Some(url) = &snapshot.banner_url {
        settings.push(GuildSetting::Banner(Some(url.clone())));
    }
    if let Some(level) = snapshot.verification_level {
        settings.push(GuildSetting::VerificationLevel(VerificationLevel::from(level)));
    }
    // The content filter can only be changed on community guilds
    if target.is_community() {
        if let Some(filter) = snapshot.explicit_content_filter {
            settings.push(GuildSetting::ExplicitContentFilter(ExplicitContentFilter::from(filter)));
        }
    }
    settings.push(GuildSetting::DefaultMessageNotifications(
        DefaultMessageNotificationLevel::from(snapshot.default_message_notifications),
    ));

    let results = join_all(settings.into_iter().map(|setting| async move {
        let label = setting.label();
        (label, guild.apply(setting).await)
    }))
    .await;

    for (label, result) in results {
        if let Err(e) = result {
            warn!("Failed to apply {} from backup: {}", label, e);
        }
    }
}

fn role_request(record: &RoleRecord) -> Result<NewRole> {
    Ok(NewRole {
        name: record.name.clone(),
        colour: parse_colour(&record.color, &record.name)?,
        hoist: record.hoist,
        mentionable: record.mentionable,
        permissions: Permissions::from_bits_retain(parse_bits(&record.permissions, &record.name)?),
    })
}

async fn load_roles(guild: &dyn GuildHandle, snapshot: &Snapshot) -> Result<()> {
    let mut records: Vec<&RoleRecord> = snapshot.roles.iter().collect();
    records.sort_by_key(|r| r.position);

    // One at a time: creation order decides the hierarchy
    for record in records {
        let request = role_request(record)?;
        if record.everyone {
            guild.edit_role(guild.everyone_role(), &request).await?;
            debug!("Updated default role as '{}'", request.name);
        } else {
            guild.create_role(&request).await?;
            debug!("Created role '{}'", request.name);
        }
    }

    info!("Loaded {} roles", snapshot.roles.len());
    Ok(())
}

async fn load_channels(
    guild: &dyn GuildHandle,
    snapshot: &Snapshot,
    target: &GuildInfo,
) -> Result<()> {
    if snapshot.channels.is_empty() {
        return Ok(());
    }

    // Overwrites resolve against the roles the previous phase created
    let roles = guild.roles().await?;

    for (index, category) in snapshot.channels.categories.iter().enumerate() {
        let mut request = NewChannel::new(category.name.clone(), ChannelType::Category);
        request.position = Some(index as u16);
        let category_id = guild.create_channel(&request).await?;

        let overwrites = permissions::resolve(&category.permissions, &roles)?;
        if !overwrites.is_empty() {
            guild.set_permissions(category_id, overwrites).await?;
        }

        try_join_all(
            category
                .children
                .iter()
                .enumerate()
                .map(|(i, child)| load_channel(guild, child, Some(category_id), i, &roles, target)),
        )
        .await?;

        debug!(
            "Created category '{}' with {} channels",
            category.name,
            category.children.len()
        );
    }

    try_join_all(
        snapshot
            .channels
            .others
            .iter()
            .enumerate()
            .map(|(i, channel)| load_channel(guild, channel, None, i, &roles, target)),
    )
    .await?;

    info!("Loaded {} channels", snapshot.channel_count());
    Ok(())
}

async fn load_channel(
    guild: &dyn GuildHandle,
    record: &ChannelRecord,
    parent: Option<ChannelId>,
    position: usize,
    roles: &[RoleInfo],
    target: &GuildInfo,
) -> Result<ChannelId> {
    let mut request = NewChannel::new(record.name(), ChannelType::Text);
    request.parent = parent;
    request.position = Some(position as u16);
    request.permission_overwrites = permissions::resolve(record.permissions(), roles)?;

    match record {
        ChannelRecord::Text(text) => {
            request.kind = if text.news && target.supports_news() {
                ChannelType::News
            } else {
                ChannelType::Text
            };
            request.topic = text.topic.clone();
            request.nsfw = text.nsfw;
            request.rate_limit_per_user = text.rate_limit_per_user;

            let id = guild.create_channel(&request).await?;
            load_threads(guild, id, request.kind, &text.threads).await?;
            Ok(id)
        }
        ChannelRecord::Voice(voice) => {
            let ceiling = target.max_bitrate();
            if voice.bitrate > ceiling {
                debug!(
                    "Clamping bitrate of '{}' from {} to {}",
                    voice.name, voice.bitrate, ceiling
                );
            }
            request.kind = ChannelType::Voice;
            request.bitrate = Some(voice.bitrate.min(ceiling));
            request.user_limit = Some(voice.users_limit);
            guild.create_channel(&request).await
        }
    }
}

async fn load_threads(
    guild: &dyn GuildHandle,
    parent: ChannelId,
    parent_kind: ChannelType,
    threads: &[ThreadRecord],
) -> Result<()> {
    let kind = if parent_kind == ChannelType::News {
        ChannelType::NewsThread
    } else {
        ChannelType::PublicThread
    };

    for thread in threads {
        let request = NewThread {
            name: thread.name.clone(),
            kind,
            auto_archive_duration: thread.auto_archive_duration,
            rate_limit_per_user: thread.rate_limit_per_user,
            archived: thread.archived,
            locked: thread.locked,
        };
        guild.create_thread(parent, &request).await?;
    }
    Ok(())
}

async fn load_afk(guild: &dyn GuildHandle, snapshot: &Snapshot) -> Result<()> {
    let Some(afk) = &snapshot.afk else {
        return Ok(());
    };

    let channels = guild.channels().await?;
    match channels
        .iter()
        .find(|c| c.name == afk.name && c.kind == ChannelType::Voice)
    {
        Some(channel) => guild.apply(GuildSetting::AfkChannel(Some(channel.id))).await?,
        None => info!("AFK channel '{}' not found, skipping", afk.name),
    }

    guild.apply(GuildSetting::AfkTimeout(afk.timeout)).await
}

async fn load_emojis(guild: &dyn GuildHandle, snapshot: &Snapshot) -> Result<()> {
    try_join_all(
        snapshot
            .emojis
            .iter()
            .map(|emoji| guild.create_emoji(&emoji.name, &emoji.url)),
    )
    .await?;
    Ok(())
}

async fn load_bans(guild: &dyn GuildHandle, snapshot: &Snapshot) -> Result<()> {
    try_join_all(snapshot.bans.iter().map(|ban| async move {
        let user = UserId::new(parse_snowflake(&ban.id)?);
        guild.ban(user, ban.reason.as_deref()).await
    }))
    .await?;
    Ok(())
}

async fn load_widget(guild: &dyn GuildHandle, snapshot: &Snapshot) -> Result<()> {
    let Some(name) = &snapshot.widget.channel else {
        return Ok(());
    };

    let channels = guild.channels().await?;
    let channel = channels.iter().find(|c| &c.name == name).map(|c| c.id);
    if channel.is_none() {
        info!("Widget channel '{}' not found, leaving it unset", name);
    }

    guild
        .apply(GuildSetting::Widget {
            enabled: snapshot.widget.enabled,
            channel,
        })
        .await
}
