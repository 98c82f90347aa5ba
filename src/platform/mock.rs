//! In-memory guild for tests

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use poise::serenity_prelude::{
    ChannelId, ChannelType, DefaultMessageNotificationLevel, EmojiId, ExplicitContentFilter,
    GuildId, PermissionOverwrite, PermissionOverwriteType, Permissions, PremiumTier, RoleId,
    UserId, VerificationLevel, WebhookId,
};
use std::collections::HashSet;

use super::{
    BanInfo, ChannelInfo, EmojiInfo, GuildHandle, GuildInfo, GuildSetting, NewChannel, NewRole,
    NewThread, RoleInfo, ThreadInfo,
};
use crate::error::{BackupError, Result};

pub struct MockState {
    pub info: GuildInfo,
    pub roles: Vec<RoleInfo>,
    pub channels: Vec<ChannelInfo>,
    pub threads: Vec<ChannelInfo>,
    pub emojis: Vec<EmojiInfo>,
    pub bans: Vec<BanInfo>,
    pub webhooks: Vec<WebhookId>,

    /// Every setting applied, in order
    pub settings: Vec<GuildSetting>,
    pub created_roles: Vec<NewRole>,
    pub edited_roles: Vec<(RoleId, NewRole)>,
    pub created_channels: Vec<NewChannel>,
    pub created_threads: Vec<(ChannelId, NewThread)>,
    /// Operation log, e.g. "create_role:Admin"
    pub calls: Vec<String>,

    /// Operations to fail, either "op" or "op:name"
    pub fail: HashSet<String>,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, op: &str, name: &str) -> Result<()> {
        self.calls.push(format!("{}:{}", op, name));
        if self.fail.contains(op) || self.fail.contains(&format!("{}:{}", op, name)) {
            return Err(BackupError::Internal {
                message: format!("injected failure in {} ({})", op, name),
            });
        }
        Ok(())
    }

    pub fn role_by_name(&self, name: &str) -> Option<&RoleInfo> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn channel_by_name(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn count_calls(&self, op: &str) -> usize {
        let prefix = format!("{}:", op);
        self.calls.iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

pub struct MockGuild {
    id: GuildId,
    state: Mutex<MockState>,
}

impl MockGuild {
    /// A guild holding only its default role
    pub fn new(id: u64) -> Self {
        let guild_id = GuildId::new(id);
        let info = GuildInfo {
            id: guild_id,
            name: format!("guild-{}", id),
            icon_url: None,
            splash_url: None,
            banner_url: None,
            verification_level: VerificationLevel::None,
            explicit_content_filter: ExplicitContentFilter::None,
            default_message_notifications: DefaultMessageNotificationLevel::All,
            afk_channel_id: None,
            afk_timeout: 300,
            widget_enabled: false,
            widget_channel_id: None,
            premium_tier: PremiumTier::Tier0,
            features: vec![],
        };

        let everyone = RoleInfo {
            id: guild_id.everyone_role(),
            name: "@everyone".to_string(),
            colour: 0,
            hoist: false,
            mentionable: false,
            managed: false,
            position: 0,
            permissions: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
        };

        Self {
            id: guild_id,
            state: Mutex::new(MockState {
                info,
                roles: vec![everyone],
                channels: vec![],
                threads: vec![],
                emojis: vec![],
                bans: vec![],
                webhooks: vec![],
                settings: vec![],
                created_roles: vec![],
                edited_roles: vec![],
                created_channels: vec![],
                created_threads: vec![],
                calls: vec![],
                fail: HashSet::new(),
                // Keep generated IDs clear of the guild ID
                next_id: id * 1000,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn fail_on(&self, op: &str) {
        self.state.lock().fail.insert(op.to_string());
    }

    pub fn with_role(&self, name: &str, position: u16, permissions: Permissions) -> RoleId {
        let mut state = self.state.lock();
        let id = RoleId::new(state.next_id());
        state.roles.push(RoleInfo {
            id,
            name: name.to_string(),
            colour: 0x3498db,
            hoist: true,
            mentionable: false,
            managed: false,
            position,
            permissions,
        });
        id
    }

    pub fn with_channel(
        &self,
        name: &str,
        kind: ChannelType,
        parent: Option<ChannelId>,
        position: u16,
    ) -> ChannelId {
        let mut state = self.state.lock();
        let id = ChannelId::new(state.next_id());
        state.channels.push(blank_channel(id, name, kind, parent, position));
        id
    }

    pub fn with_voice(
        &self,
        name: &str,
        parent: Option<ChannelId>,
        position: u16,
        bitrate: u32,
    ) -> ChannelId {
        let id = self.with_channel(name, ChannelType::Voice, parent, position);
        let mut state = self.state.lock();
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == id) {
            channel.bitrate = Some(bitrate);
            channel.user_limit = Some(0);
        }
        id
    }

    pub fn with_overwrite(&self, channel: ChannelId, overwrite: PermissionOverwrite) {
        let mut state = self.state.lock();
        if let Some(c) = state.channels.iter_mut().find(|c| c.id == channel) {
            c.permission_overwrites.push(overwrite);
        }
    }

    pub fn with_thread(
        &self,
        parent: ChannelId,
        name: &str,
        auto_archive_duration: Option<u16>,
    ) -> ChannelId {
        let mut state = self.state.lock();
        let id = ChannelId::new(state.next_id());
        let mut thread = blank_channel(id, name, ChannelType::PublicThread, Some(parent), 0);
        thread.thread = Some(ThreadInfo {
            archived: false,
            locked: false,
            auto_archive_duration,
        });
        state.threads.push(thread);
        id
    }

    pub fn with_emoji(&self, name: &str) -> EmojiId {
        let mut state = self.state.lock();
        let id = EmojiId::new(state.next_id());
        state.emojis.push(EmojiInfo {
            id,
            name: name.to_string(),
            url: format!("https://cdn.example.com/emojis/{}.png", id),
        });
        id
    }

    pub fn with_ban(&self, user: u64, reason: Option<&str>) {
        self.state.lock().bans.push(BanInfo {
            user_id: UserId::new(user),
            reason: reason.map(str::to_string),
        });
    }

    pub fn with_webhook(&self) -> WebhookId {
        let mut state = self.state.lock();
        let id = WebhookId::new(state.next_id());
        state.webhooks.push(id);
        id
    }

    pub fn with_tier(&self, tier: PremiumTier) {
        self.state.lock().info.premium_tier = tier;
    }

    pub fn with_feature(&self, feature: &str) {
        self.state.lock().info.features.push(feature.to_string());
    }
}

fn blank_channel(
    id: ChannelId,
    name: &str,
    kind: ChannelType,
    parent_id: Option<ChannelId>,
    position: u16,
) -> ChannelInfo {
    ChannelInfo {
        id,
        name: name.to_string(),
        kind,
        parent_id,
        position,
        topic: None,
        nsfw: false,
        rate_limit_per_user: None,
        bitrate: None,
        user_limit: None,
        permission_overwrites: vec![],
        thread: None,
    }
}

pub fn role_overwrite(role: RoleId, allow: Permissions, deny: Permissions) -> PermissionOverwrite {
    PermissionOverwrite {
        allow,
        deny,
        kind: PermissionOverwriteType::Role(role),
    }
}

#[async_trait]
impl GuildHandle for MockGuild {
    fn id(&self) -> GuildId {
        self.id
    }

    async fn info(&self) -> Result<GuildInfo> {
        let mut state = self.state.lock();
        state.check("info", "")?;
        Ok(state.info.clone())
    }

    async fn roles(&self) -> Result<Vec<RoleInfo>> {
        let mut state = self.state.lock();
        state.check("roles", "")?;
        Ok(state.roles.clone())
    }

    async fn channels(&self) -> Result<Vec<ChannelInfo>> {
        let mut state = self.state.lock();
        state.check("channels", "")?;
        Ok(state.channels.clone())
    }

    async fn active_threads(&self) -> Result<Vec<ChannelInfo>> {
        let mut state = self.state.lock();
        state.check("active_threads", "")?;
        Ok(state.threads.clone())
    }

    async fn emojis(&self) -> Result<Vec<EmojiInfo>> {
        let mut state = self.state.lock();
        state.check("emojis", "")?;
        Ok(state.emojis.clone())
    }

    async fn bans(&self) -> Result<Vec<BanInfo>> {
        let mut state = self.state.lock();
        state.check("bans", "")?;
        Ok(state.bans.clone())
    }

    async fn webhooks(&self) -> Result<Vec<WebhookId>> {
        let mut state = self.state.lock();
        state.check("webhooks", "")?;
        Ok(state.webhooks.clone())
    }

    async fn create_role(&self, role: &NewRole) -> Result<RoleId> {
        let mut state = self.state.lock();
        state.check("create_role", &role.name)?;
        let id = RoleId::new(state.next_id());
        let position = state.roles.iter().map(|r| r.position).max().unwrap_or(0) + 1;
        state.roles.push(RoleInfo {
            id,
            name: role.name.clone(),
            colour: role.colour,
            hoist: role.hoist,
            mentionable: role.mentionable,
            managed: false,
            position,
            permissions: role.permissions,
        });
        state.created_roles.push(role.clone());
        Ok(id)
    }

    async fn edit_role(&self, id: RoleId, role: &NewRole) -> Result<()> {
        let mut state = self.state.lock();
        state.check("edit_role", &role.name)?;
        let existing = state
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| BackupError::Internal {
                message: format!("unknown role {}", id),
            })?;
        existing.name = role.name.clone();
        existing.colour = role.colour;
        existing.hoist = role.hoist;
        existing.mentionable = role.mentionable;
        existing.permissions = role.permissions;
        state.edited_roles.push((id, role.clone()));
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<()> {
        let mut state = self.state.lock();
        let name = state
            .roles
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.clone())
            .unwrap_or_default();
        state.check("delete_role", &name)?;
        if id == self.id.everyone_role() {
            return Err(BackupError::Internal {
                message: "the default role cannot be deleted".to_string(),
            });
        }
        if state.roles.iter().any(|r| r.id == id && r.managed) {
            return Err(BackupError::Internal {
                message: format!("role '{}' is managed by an integration", name),
            });
        }
        state.roles.retain(|r| r.id != id);
        Ok(())
    }

    async fn create_channel(&self, channel: &NewChannel) -> Result<ChannelId> {
        let mut state = self.state.lock();
        state.check("create_channel", &channel.name)?;
        let id = ChannelId::new(state.next_id());
        let position = channel.position.unwrap_or(state.channels.len() as u16);
        state.channels.push(ChannelInfo {
            id,
            name: channel.name.clone(),
            kind: channel.kind,
            parent_id: channel.parent,
            position,
            topic: channel.topic.clone(),
            nsfw: channel.nsfw,
            rate_limit_per_user: channel.rate_limit_per_user,
            bitrate: channel.bitrate,
            user_limit: channel.user_limit,
            permission_overwrites: channel.permission_overwrites.clone(),
            thread: None,
        });
        state.created_channels.push(channel.clone());
        Ok(id)
    }

    async fn set_permissions(
        &self,
        id: ChannelId,
        overwrites: Vec<PermissionOverwrite>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let name = state
            .channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        state.check("set_permissions", &name)?;
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == id) {
            channel.permission_overwrites = overwrites;
        }
        Ok(())
    }

    async fn delete_channel(&self, id: ChannelId) -> Result<()> {
        let mut state = self.state.lock();
        let name = state
            .channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        state.check("delete_channel", &name)?;
        state.channels.retain(|c| c.id != id);
        state.threads.retain(|t| t.parent_id != Some(id));
        Ok(())
    }

    async fn create_thread(&self, parent: ChannelId, thread: &NewThread) -> Result<ChannelId> {
        let mut state = self.state.lock();
        state.check("create_thread", &thread.name)?;
        let id = ChannelId::new(state.next_id());
        let mut info = blank_channel(id, &thread.name, thread.kind, Some(parent), 0);
        info.rate_limit_per_user = thread.rate_limit_per_user;
        info.thread = Some(ThreadInfo {
            archived: thread.archived,
            locked: thread.locked,
            auto_archive_duration: Some(thread.auto_archive_duration),
        });
        state.threads.push(info);
        state.created_threads.push((parent, thread.clone()));
        Ok(id)
    }

    async fn create_emoji(&self, name: &str, url: &str) -> Result<EmojiId> {
        let mut state = self.state.lock();
        state.check("create_emoji", name)?;
        let id = EmojiId::new(state.next_id());
        state.emojis.push(EmojiInfo {
            id,
            name: name.to_string(),
            url: url.to_string(),
        });
        Ok(id)
    }

    async fn delete_emoji(&self, id: EmojiId) -> Result<()> {
        let mut state = self.state.lock();
        let name = state
            .emojis
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.clone())
            .unwrap_or_default();
        state.check("delete_emoji", &name)?;
        state.emojis.retain(|e| e.id != id);
        Ok(())
    }

    async fn ban(&self, user: UserId, reason: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        state.check("ban", &user.to_string())?;
        state.bans.push(BanInfo {
            user_id: user,
            reason: reason.map(str::to_string),
        });
        Ok(())
    }

    async fn unban(&self, user: UserId) -> Result<()> {
        let mut state = self.state.lock();
        state.check("unban", &user.to_string())?;
        state.bans.retain(|b| b.user_id != user);
        Ok(())
    }

    async fn delete_webhook(&self, id: WebhookId) -> Result<()> {
        let mut state = self.state.lock();
        state.check("delete_webhook", &id.to_string())?;
        state.webhooks.retain(|w| *w != id);
        Ok(())
    }

    async fn apply(&self, setting: GuildSetting) -> Result<()> {
        let mut state = self.state.lock();
        state.check("apply", setting.label())?;
        match &setting {
            GuildSetting::Name(name) => state.info.name = name.clone(),
            GuildSetting::Icon(url) => state.info.icon_url = url.clone(),
            GuildSetting::Splash(url) => state.info.splash_url = url.clone(),
            GuildSetting::Banner(url) => state.info.banner_url = url.clone(),
            GuildSetting::VerificationLevel(level) => state.info.verification_level = *level,
            GuildSetting::ExplicitContentFilter(filter) => {
                state.info.explicit_content_filter = *filter
            }
            GuildSetting::DefaultMessageNotifications(level) => {
                state.info.default_message_notifications = *level
            }
            GuildSetting::AfkChannel(channel) => state.info.afk_channel_id = *channel,
            GuildSetting::AfkTimeout(seconds) => state.info.afk_timeout = *seconds,
            GuildSetting::SystemChannel(_) | GuildSetting::SystemChannelFlags(_) => {}
            GuildSetting::Widget { enabled, channel } => {
                state.info.widget_enabled = *enabled;
                state.info.widget_channel_id = *channel;
            }
        }
        state.settings.push(setting);
        Ok(())
    }
}
