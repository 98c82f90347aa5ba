//! Access to a live guild on the chat platform.
//!
//! Export, flush and import only talk to a guild through [`GuildHandle`].
//! The production implementation wraps serenity's HTTP client; tests use an
//! in-memory guild.

#[cfg(test)]
pub mod mock;
mod serenity_guild;

pub use serenity_guild::SerenityGuild;

use async_trait::async_trait;
use poise::serenity_prelude::{
    ChannelId, ChannelType, DefaultMessageNotificationLevel, EmojiId, ExplicitContentFilter,
    GuildId, PermissionOverwrite, Permissions, PremiumTier, RoleId, SystemChannelFlags, UserId,
    VerificationLevel, WebhookId,
};

use crate::error::Result;

/// Guild feature that unlocks community settings
pub const FEATURE_COMMUNITY: &str = "COMMUNITY";
/// Guild feature that allows announcement channels
pub const FEATURE_NEWS: &str = "NEWS";

/// Top-level guild metadata
#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub icon_url: Option<String>,
    pub splash_url: Option<String>,
    pub banner_url: Option<String>,
    pub verification_level: VerificationLevel,
    pub explicit_content_filter: ExplicitContentFilter,
    pub default_message_notifications: DefaultMessageNotificationLevel,
    pub afk_channel_id: Option<ChannelId>,
    /// AFK timeout in seconds
    pub afk_timeout: u16,
    pub widget_enabled: bool,
    pub widget_channel_id: Option<ChannelId>,
    pub premium_tier: PremiumTier,
    pub features: Vec<String>,
}

impl GuildInfo {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Community guilds lock verification level and content filter
    pub fn is_community(&self) -> bool {
        self.has_feature(FEATURE_COMMUNITY)
    }

    pub fn supports_news(&self) -> bool {
        self.has_feature(FEATURE_NEWS)
    }

    /// Highest voice bitrate allowed by the guild's boost tier
    pub fn max_bitrate(&self) -> u32 {
        match self.premium_tier {
            PremiumTier::Tier1 => 128_000,
            PremiumTier::Tier2 => 256_000,
            PremiumTier::Tier3 => 384_000,
            _ => 64_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub colour: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub managed: bool,
    pub position: u16,
    pub permissions: Permissions,
}

/// A guild channel, category or thread
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelType,
    pub parent_id: Option<ChannelId>,
    pub position: u16,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub rate_limit_per_user: Option<u16>,
    pub bitrate: Option<u32>,
    pub user_limit: Option<u32>,
    pub permission_overwrites: Vec<PermissionOverwrite>,
    /// Present for threads only
    pub thread: Option<ThreadInfo>,
}

impl ChannelInfo {
    pub fn is_thread(&self) -> bool {
        matches!(
            self.kind,
            ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
        )
    }
}

#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub archived: bool,
    pub locked: bool,
    /// Minutes, if the platform reported one
    pub auto_archive_duration: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct EmojiInfo {
    pub id: EmojiId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct BanInfo {
    pub user_id: UserId,
    pub reason: Option<String>,
}

/// Attributes for creating or editing a role
#[derive(Debug, Clone, PartialEq)]
pub struct NewRole {
    pub name: String,
    pub colour: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub permissions: Permissions,
}

/// Attributes for creating a channel or category
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelType,
    pub parent: Option<ChannelId>,
    pub position: Option<u16>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub rate_limit_per_user: Option<u16>,
    pub bitrate: Option<u32>,
    pub user_limit: Option<u32>,
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

impl NewChannel {
    pub fn new(name: impl Into<String>, kind: ChannelType) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            position: None,
            topic: None,
            nsfw: false,
            rate_limit_per_user: None,
            bitrate: None,
            user_limit: None,
            permission_overwrites: Vec::new(),
        }
    }
}

/// Attributes for creating a thread
#[derive(Debug, Clone, PartialEq)]
pub struct NewThread {
    pub name: String,
    pub kind: ChannelType,
    /// Minutes
    pub auto_archive_duration: u16,
    pub rate_limit_per_user: Option<u16>,
    pub archived: bool,
    pub locked: bool,
}

/// One guild-level setting change
#[derive(Debug, Clone, PartialEq)]
pub enum GuildSetting {
    Name(String),
    /// Image source URL, `None` clears it
    Icon(Option<String>),
    Splash(Option<String>),
    Banner(Option<String>),
    VerificationLevel(VerificationLevel),
    ExplicitContentFilter(ExplicitContentFilter),
    DefaultMessageNotifications(DefaultMessageNotificationLevel),
    AfkChannel(Option<ChannelId>),
    /// Seconds
    AfkTimeout(u16),
    SystemChannel(Option<ChannelId>),
    SystemChannelFlags(SystemChannelFlags),
    Widget {
        enabled: bool,
        channel: Option<ChannelId>,
    },
}

impl GuildSetting {
    pub fn label(&self) -> &'static str {
        match self {
            GuildSetting::Name(_) => "name",
            GuildSetting::Icon(_) => "icon",
            GuildSetting::Splash(_) => "splash",
            GuildSetting::Banner(_) => "banner",
            GuildSetting::VerificationLevel(_) => "verification level",
            GuildSetting::ExplicitContentFilter(_) => "explicit content filter",
            GuildSetting::DefaultMessageNotifications(_) => "default notifications",
            GuildSetting::AfkChannel(_) => "afk channel",
            GuildSetting::AfkTimeout(_) => "afk timeout",
            GuildSetting::SystemChannel(_) => "system channel",
            GuildSetting::SystemChannelFlags(_) => "system channel flags",
            GuildSetting::Widget { .. } => "widget",
        }
    }
}

/// A live guild that can be read and mutated
#[async_trait]
pub trait GuildHandle: Send + Sync {
    fn id(&self) -> GuildId;

    /// The built-in default role shares the guild's ID
    fn everyone_role(&self) -> RoleId {
        self.id().everyone_role()
    }

    async fn info(&self) -> Result<GuildInfo>;
    async fn roles(&self) -> Result<Vec<RoleInfo>>;
    /// Channels and categories, without threads
    async fn channels(&self) -> Result<Vec<ChannelInfo>>;
    async fn active_threads(&self) -> Result<Vec<ChannelInfo>>;
    async fn emojis(&self) -> Result<Vec<EmojiInfo>>;
    async fn bans(&self) -> Result<Vec<BanInfo>>;
    async fn webhooks(&self) -> Result<Vec<WebhookId>>;

    async fn create_role(&self, role: &NewRole) -> Result<RoleId>;
    async fn edit_role(&self, id: RoleId, role: &NewRole) -> Result<()>;
    async fn delete_role(&self, id: RoleId) -> Result<()>;

    async fn create_channel(&self, channel: &NewChannel) -> Result<ChannelId>;
    async fn set_permissions(
        &self,
        id: ChannelId,
        overwrites: Vec<PermissionOverwrite>,
    ) -> Result<()>;
    async fn delete_channel(&self, id: ChannelId) -> Result<()>;
    async fn create_thread(&self, parent: ChannelId, thread: &NewThread) -> Result<ChannelId>;

    /// Upload an emoji from an image URL
    async fn create_emoji(&self, name: &str, url: &str) -> Result<EmojiId>;
    async fn delete_emoji(&self, id: EmojiId) -> Result<()>;

    async fn ban(&self, user: UserId, reason: Option<&str>) -> Result<()>;
    async fn unban(&self, user: UserId) -> Result<()>;
    async fn delete_webhook(&self, id: WebhookId) -> Result<()>;

    async fn apply(&self, setting: GuildSetting) -> Result<()>;
}
