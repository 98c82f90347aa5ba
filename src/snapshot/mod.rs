//! Portable guild snapshot format.
//!
//! A [`Snapshot`] is a point-in-time, self-contained copy of a guild's
//! configuration. Cross references (permission overwrites, AFK and widget
//! channels) are stored by name so a snapshot can be replayed onto a different
//! guild. Field names match the JSON layout of existing backup files, and
//! older files that spell `childeren` or use numeric channel types still load.

pub mod snowflake;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BackupError, Result};

/// Root export unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Guild display name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_level: Option<u8>,

    // Spelling kept for compatibility with existing backup files
    #[serde(
        rename = "explictContentFilter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub explicit_content_filter: Option<u8>,

    #[serde(default)]
    pub default_message_notifications: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub afk: Option<AfkRecord>,

    #[serde(default)]
    pub widget: WidgetRecord,

    #[serde(default)]
    pub channels: ChannelTree,

    /// Roles in ascending position order
    #[serde(default)]
    pub roles: Vec<RoleRecord>,

    #[serde(default)]
    pub emojis: Vec<EmojiRecord>,

    #[serde(default)]
    pub bans: Vec<BanRecord>,

    /// Milliseconds since the Unix epoch
    pub created_timestamp: i64,

    /// Snapshot identifier (caller supplied or a generated snowflake)
    pub id: String,

    /// Guild the snapshot was taken from. Provenance only.
    #[serde(rename = "guildID")]
    pub guild_id: String,

    #[serde(rename = "iconURL", default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(rename = "splashURL", default, skip_serializing_if = "Option::is_none")]
    pub splash_url: Option<String>,

    #[serde(rename = "bannerURL", default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
}

impl Snapshot {
    /// Total number of channels, categories included
    pub fn channel_count(&self) -> usize {
        self.channels.categories.len()
            + self
                .channels
                .categories
                .iter()
                .map(|c| c.children.len())
                .sum::<usize>()
            + self.channels.others.len()
    }

    /// Check the invariants import relies on, before anything is mutated
    pub fn validate(&self) -> Result<()> {
        let defaults = self.roles.iter().filter(|r| r.everyone).count();
        if !self.roles.is_empty() && defaults != 1 {
            return Err(BackupError::InvalidBackup {
                message: format!(
                    "expected exactly one default role, found {}",
                    defaults
                ),
            });
        }

        for role in &self.roles {
            parse_bits(&role.permissions, &role.name)?;
            parse_colour(&role.color, &role.name)?;
        }

        let overwrites = self
            .channels
            .categories
            .iter()
            .flat_map(|c| {
                c.permissions
                    .iter()
                    .chain(c.children.iter().flat_map(|ch| ch.permissions().iter()))
            })
            .chain(
                self.channels
                    .others
                    .iter()
                    .flat_map(|ch| ch.permissions().iter()),
            );
        for overwrite in overwrites {
            parse_bits(&overwrite.allow, &overwrite.role)?;
            parse_bits(&overwrite.deny, &overwrite.role)?;
        }

        for ban in &self.bans {
            parse_snowflake(&ban.id)?;
        }

        Ok(())
    }
}

/// Parse a decimal permission string
pub fn parse_bits(bits: &str, owner: &str) -> Result<u64> {
    bits.parse::<u64>().map_err(|_| BackupError::InvalidBackup {
        message: format!("invalid permission value '{}' for '{}'", bits, owner),
    })
}

/// Parse a `#rrggbb` colour
pub fn parse_colour(colour: &str, owner: &str) -> Result<u32> {
    u32::from_str_radix(colour.trim_start_matches('#'), 16)
        .ok()
        .filter(|c| *c <= 0xff_ff_ff)
        .ok_or_else(|| BackupError::InvalidBackup {
            message: format!("invalid colour '{}' for '{}'", colour, owner),
        })
}

/// Parse a platform identifier, which is never zero
pub fn parse_snowflake(id: &str) -> Result<u64> {
    id.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| BackupError::InvalidBackup {
            message: format!("invalid identifier '{}'", id),
        })
}

/// AFK channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfkRecord {
    /// Name of the AFK voice channel
    pub name: String,
    /// Timeout in seconds
    pub timeout: u16,
}

/// Widget settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Categories with their children, plus top-level channels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelTree {
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
    #[serde(default)]
    pub others: Vec<ChannelRecord>,
}

impl ChannelTree {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.others.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default, alias = "childeren")]
    pub children: Vec<ChannelRecord>,
}

/// A text-like or voice-like channel, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelRecord {
    Text(TextChannelRecord),
    Voice(VoiceChannelRecord),
}

// Platform channel type numbers found in older backup files
const TYPE_TEXT: u64 = 0;
const TYPE_VOICE: u64 = 2;
const TYPE_ANNOUNCEMENT: u64 = 5;
const TYPE_FORUM: u64 = 15;

impl<'de> Deserialize<'de> for ChannelRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let tag = value.get("type").cloned().unwrap_or(serde_json::Value::Null);

        let (voice, announcement) = match &tag {
            serde_json::Value::String(s) if s == "text" => (false, false),
            serde_json::Value::String(s) if s == "voice" => (true, false),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(TYPE_TEXT) | Some(TYPE_FORUM) => (false, false),
                Some(TYPE_ANNOUNCEMENT) => (false, true),
                Some(TYPE_VOICE) => (true, false),
                _ => return Err(D::Error::custom(format!("unsupported channel type {}", n))),
            },
            other => return Err(D::Error::custom(format!("unknown channel type {}", other))),
        };

        if voice {
            serde_json::from_value(value)
                .map(ChannelRecord::Voice)
                .map_err(D::Error::custom)
        } else {
            let mut text: TextChannelRecord =
                serde_json::from_value(value).map_err(D::Error::custom)?;
            text.news |= announcement;
            Ok(ChannelRecord::Text(text))
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChannelRecord {
    pub fn name(&self) -> &str {
        match self {
            ChannelRecord::Text(c) => &c.name,
            ChannelRecord::Voice(c) => &c.name,
        }
    }

    pub fn permissions(&self) -> &[PermissionRecord] {
        match self {
            ChannelRecord::Text(c) => &c.permissions,
            ChannelRecord::Voice(c) => &c.permissions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChannelRecord {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default)]
    pub topic: Option<String>,
    /// Slow mode in seconds, only recorded for standard text channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_user: Option<u16>,
    #[serde(default)]
    pub nsfw: bool,
    /// Announcement channel
    #[serde(default)]
    pub news: bool,
    #[serde(default)]
    pub threads: Vec<ThreadRecord>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceChannelRecord {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    /// 0 means unlimited
    #[serde(default)]
    pub users_limit: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub rate_limit_per_user: Option<u16>,
    /// Minutes of inactivity before the thread is archived
    pub auto_archive_duration: u16,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

/// Reserved: message history is not exported yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

/// Role-scoped overwrite, keyed by role name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub role: String,
    pub allow: String,
    pub deny: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: String,
    /// Hex color (e.g., "#ff0000")
    pub color: String,
    pub hoist: bool,
    /// Permission bitfield as a decimal string
    pub permissions: String,
    pub position: u16,
    pub mentionable: bool,
    /// Marks the guild's built-in default role
    pub everyone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Banned user ID
    pub id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiRecord {
    pub name: String,
    pub url: String,
}
