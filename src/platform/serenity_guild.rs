use async_trait::async_trait;
use base64::Engine;
use poise::serenity_prelude::{
    self as serenity, AfkTimeout, AutoArchiveDuration, ChannelId, Colour, CreateAttachment,
    CreateChannel, CreateThread, EditChannel, EditGuild, EditRole, EditThread, EmojiId, GuildId,
    Http, PermissionOverwrite, RoleId, UserId, UserPagination, WebhookId,
};
use std::sync::Arc;
use tracing::debug;

use super::{
    BanInfo, ChannelInfo, EmojiInfo, GuildHandle, GuildInfo, GuildSetting, NewChannel, NewRole,
    NewThread, RoleInfo, ThreadInfo,
};
use crate::error::{BackupError, Result};

const AUDIT_REASON: &str = "Guild backup";

/// The platform returns at most this many bans per page
const BAN_PAGE_SIZE: usize = 1000;

fn widget_body(enabled: bool, channel: Option<ChannelId>) -> serde_json::Value {
    serde_json::json!({
        "enabled": enabled,
        "channel_id": channel,
    })
}

/// [`GuildHandle`] backed by serenity's REST client
pub struct SerenityGuild {
    http: Arc<Http>,
    guild_id: GuildId,
    client: reqwest::Client,
}

impl SerenityGuild {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self {
            http,
            guild_id,
            client: reqwest::Client::new(),
        }
    }

    fn http(&self) -> &Http {
        &self.http
    }

    /// Download an image, returning its bytes and content type
    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let to_error = |source| BackupError::Download {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(to_error)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        let bytes = response.bytes().await.map_err(to_error)?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok((bytes.to_vec(), content_type))
    }

    async fn attachment(&self, url: &str, filename: &str) -> Result<CreateAttachment> {
        let (bytes, _) = self.download(url).await?;
        Ok(CreateAttachment::bytes(bytes, filename))
    }
}

fn role_builder(role: &NewRole) -> EditRole<'_> {
    EditRole::new()
        .name(&role.name)
        .colour(Colour::new(role.colour))
        .hoist(role.hoist)
        .mentionable(role.mentionable)
        .permissions(role.permissions)
        .audit_log_reason(AUDIT_REASON)
}

fn channel_info(channel: &serenity::GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id,
        name: channel.name.clone(),
        kind: channel.kind,
        parent_id: channel.parent_id,
        position: channel.position,
        topic: channel.topic.clone(),
        nsfw: channel.nsfw,
        rate_limit_per_user: channel.rate_limit_per_user,
        bitrate: channel.bitrate,
        user_limit: channel.user_limit,
        permission_overwrites: channel.permission_overwrites.clone(),
        thread: channel.thread_metadata.as_ref().map(|meta| ThreadInfo {
            archived: meta.archived,
            locked: meta.locked,
            auto_archive_duration: Some(u16::from(meta.auto_archive_duration)),
        }),
    }
}

#[async_trait]
impl GuildHandle for SerenityGuild {
    fn id(&self) -> GuildId {
        self.guild_id
    }

    async fn info(&self) -> Result<GuildInfo> {
        let guild = self.guild_id.to_partial_guild(self.http()).await?;

        let (afk_channel_id, afk_timeout) = match &guild.afk_metadata {
            Some(meta) => (Some(meta.afk_channel_id), u16::from(meta.afk_timeout)),
            None => (None, 300),
        };

        Ok(GuildInfo {
            id: guild.id,
            name: guild.name.clone(),
            icon_url: guild.icon_url(),
            splash_url: guild.splash_url(),
            banner_url: guild.banner_url(),
            verification_level: guild.verification_level,
            explicit_content_filter: guild.explicit_content_filter,
            default_message_notifications: guild.default_message_notifications,
            afk_channel_id,
            afk_timeout,
            widget_enabled: guild.widget_enabled.unwrap_or(false),
            widget_channel_id: guild.widget_channel_id,
            premium_tier: guild.premium_tier,
            features: guild.features.clone(),
        })
    }

    async fn roles(&self) -> Result<Vec<RoleInfo>> {
        let roles = self.guild_id.roles(self.http()).await?;
        Ok(roles
            .into_values()
            .map(|role| RoleInfo {
                id: role.id,
                name: role.name,
                colour: role.colour.0,
                hoist: role.hoist,
                mentionable: role.mentionable,
                managed: role.managed,
                position: role.position,
                permissions: role.permissions,
            })
            .collect())
    }

    async fn channels(&self) -> Result<Vec<ChannelInfo>> {
        let channels = self.guild_id.channels(self.http()).await?;
        Ok(channels.values().map(channel_info).collect())
    }

    async fn active_threads(&self) -> Result<Vec<ChannelInfo>> {
        let data = self.guild_id.get_active_threads(self.http()).await?;
        Ok(data.threads.iter().map(channel_info).collect())
    }

    async fn emojis(&self) -> Result<Vec<EmojiInfo>> {
        let emojis = self.guild_id.emojis(self.http()).await?;
        Ok(emojis
            .into_iter()
            .map(|emoji| EmojiInfo {
                id: emoji.id,
                url: emoji.url(),
                name: emoji.name,
            })
            .collect())
    }

    async fn bans(&self) -> Result<Vec<BanInfo>> {
        let mut bans = Vec::new();
        let mut after = None;

        loop {
            let page = self.guild_id.bans(self.http(), after, None).await?;
            let page_len = page.len();
            after = page.last().map(|ban| UserPagination::After(ban.user.id));

            bans.extend(page.into_iter().map(|ban| BanInfo {
                user_id: ban.user.id,
                reason: ban.reason,
            }));

            if page_len < BAN_PAGE_SIZE {
                break;
            }
        }

        Ok(bans)
    }

    async fn webhooks(&self) -> Result<Vec<WebhookId>> {
        let webhooks = self.guild_id.webhooks(self.http()).await?;
        Ok(webhooks.into_iter().map(|w| w.id).collect())
    }

    async fn create_role(&self, role: &NewRole) -> Result<RoleId> {
        let created = self
            .guild_id
            .create_role(self.http(), role_builder(role))
            .await?;
        Ok(created.id)
    }

    async fn edit_role(&self, id: RoleId, role: &NewRole) -> Result<()> {
        self.guild_id
            .edit_role(self.http(), id, role_builder(role))
            .await?;
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.guild_id.delete_role(self.http(), id).await?;
        Ok(())
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<ChannelId> {
        let mut builder = CreateChannel::new(&channel.name)
            .kind(channel.kind)
            .nsfw(channel.nsfw)
            .permissions(channel.permission_overwrites.clone())
            .audit_log_reason(AUDIT_REASON);

        if let Some(parent) = channel.parent {
            builder = builder.category(parent);
        }
        if let Some(position) = channel.position {
            builder = builder.position(position);
        }
        if let Some(topic) = &channel.topic {
            builder = builder.topic(topic);
        }
        if let Some(rate_limit) = channel.rate_limit_per_user {
            builder = builder.rate_limit_per_user(rate_limit);
        }
        if let Some(bitrate) = channel.bitrate {
            builder = builder.bitrate(bitrate);
        }
        if let Some(user_limit) = channel.user_limit {
            builder = builder.user_limit(user_limit);
        }

        let created = self.guild_id.create_channel(self.http(), builder).await?;
        Ok(created.id)
    }

    async fn set_permissions(
        &self,
        id: ChannelId,
        overwrites: Vec<PermissionOverwrite>,
    ) -> Result<()> {
        id.edit(self.http(), EditChannel::new().permissions(overwrites))
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, id: ChannelId) -> Result<()> {
        id.delete(self.http()).await?;
        Ok(())
    }

    async fn create_thread(&self, parent: ChannelId, thread: &NewThread) -> Result<ChannelId> {
        let mut builder = CreateThread::new(&thread.name)
            .kind(thread.kind)
            .auto_archive_duration(AutoArchiveDuration::from(thread.auto_archive_duration))
            .audit_log_reason(AUDIT_REASON);
        if let Some(rate_limit) = thread.rate_limit_per_user {
            builder = builder.rate_limit_per_user(rate_limit);
        }

        let created = parent.create_thread(self.http(), builder).await?;

        // Threads can only be locked or archived once they exist
        if thread.locked || thread.archived {
            created
                .id
                .edit_thread(
                    self.http(),
                    EditThread::new()
                        .locked(thread.locked)
                        .archived(thread.archived),
                )
                .await?;
        }

        Ok(created.id)
    }

    async fn create_emoji(&self, name: &str, url: &str) -> Result<EmojiId> {
        let (bytes, content_type) = self.download(url).await?;
        let image = format!(
            "data:{};base64,{}",
            content_type,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );

        let emoji = self.guild_id.create_emoji(self.http(), name, &image).await?;
        Ok(emoji.id)
    }

    async fn delete_emoji(&self, id: EmojiId) -> Result<()> {
        self.guild_id.delete_emoji(self.http(), id).await?;
        Ok(())
    }

    async fn ban(&self, user: UserId, reason: Option<&str>) -> Result<()> {
        match reason {
            Some(reason) => {
                self.guild_id
                    .ban_with_reason(self.http(), user, 0, reason)
                    .await?
            }
            None => self.guild_id.ban(self.http(), user, 0).await?,
        }
        Ok(())
    }

    async fn unban(&self, user: UserId) -> Result<()> {
        self.guild_id.unban(self.http(), user).await?;
        Ok(())
    }

    async fn delete_webhook(&self, id: WebhookId) -> Result<()> {
        self.http().delete_webhook(id, Some(AUDIT_REASON)).await?;
        Ok(())
    }

    async fn apply(&self, setting: GuildSetting) -> Result<()> {
        // The widget has its own endpoint. A null `channel_id` clears the channel.
        if let GuildSetting::Widget { enabled, channel } = setting {
            let body = widget_body(enabled, channel);
            self.http()
                .edit_guild_widget(self.guild_id, &body, Some(AUDIT_REASON))
                .await?;
            return Ok(());
        }

        let image = match &setting {
            GuildSetting::Icon(Some(url)) => Some(self.attachment(url, "icon.png").await?),
            GuildSetting::Splash(Some(url)) => Some(self.attachment(url, "splash.png").await?),
            GuildSetting::Banner(Some(url)) => Some(self.attachment(url, "banner.png").await?),
            _ => None,
        };

        let builder = EditGuild::new().audit_log_reason(AUDIT_REASON);
        let builder = match setting {
            GuildSetting::Name(name) => builder.name(name),
            GuildSetting::Icon(_) => builder.icon(image.as_ref()),
            // Splash and banner take base64 data rather than an attachment
            GuildSetting::Splash(_) => builder.splash(image.map(|a| a.to_base64())),
            GuildSetting::Banner(_) => builder.banner(image.map(|a| a.to_base64())),
            GuildSetting::VerificationLevel(level) => builder.verification_level(level),
            GuildSetting::ExplicitContentFilter(filter) => {
                builder.explicit_content_filter(Some(filter))
            }
            GuildSetting::DefaultMessageNotifications(level) => {
                builder.default_message_notifications(Some(level))
            }
            GuildSetting::AfkChannel(channel) => builder.afk_channel(channel),
            GuildSetting::AfkTimeout(seconds) => builder.afk_timeout(AfkTimeout::from(seconds)),
            GuildSetting::SystemChannel(channel) => builder.system_channel_id(channel),
            GuildSetting::SystemChannelFlags(flags) => builder.system_channel_flags(flags),
            GuildSetting::Widget { .. } => builder,
        };

        self.guild_id.edit(self.http(), builder).await?;
        Ok(())
    }
}
