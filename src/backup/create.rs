use poise::serenity_prelude::{ChannelId, ChannelType};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::channels;
use crate::error::{BackupError, Result};
use crate::platform::{ChannelInfo, GuildHandle, RoleInfo};
use crate::snapshot::{
    snowflake, AfkRecord, BanRecord, CategoryRecord, ChannelTree, EmojiRecord, RoleRecord,
    Snapshot, WidgetRecord,
};

/// A part of the snapshot that can be left out of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Bans,
    Roles,
    Channels,
    Emojis,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Bans => "bans",
            Section::Roles => "roles",
            Section::Channels => "channels",
            Section::Emojis => "emojis",
        }
    }

    /// Parse a comma or whitespace separated list such as `"bans, emojis"`
    pub fn parse_list(list: &str) -> Result<HashSet<Section>> {
        list.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Section>())
            .collect()
    }
}

impl FromStr for Section {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bans" => Ok(Section::Bans),
            "roles" => Ok(Section::Roles),
            "channels" => Ok(Section::Channels),
            "emojis" => Ok(Section::Emojis),
            _ => Err(BackupError::UnknownSection {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Use this identifier instead of a generated one
    pub custom_id: Option<String>,
    pub exclude: HashSet<Section>,
}

impl CreateOptions {
    fn includes(&self, section: Section) -> bool {
        !self.exclude.contains(&section)
    }
}

/// Take a full snapshot of a guild
pub async fn create_backup(guild: &dyn GuildHandle, options: &CreateOptions) -> Result<Snapshot> {
    let info = guild.info().await?;
    info!("Creating backup of guild '{}' ({})", info.name, info.id);

    // AFK and widget channels are stored by name, so channels are always read
    let all_channels = guild.channels().await?;
    let channel_name = |id: Option<ChannelId>| {
        id.and_then(|id| all_channels.iter().find(|c| c.id == id))
            .map(|c| c.name.clone())
    };

    let afk = info.afk_channel_id.and_then(|id| {
        channel_name(Some(id)).map(|name| AfkRecord {
            name,
            timeout: info.afk_timeout,
        })
    });

    let widget = WidgetRecord {
        enabled: info.widget_enabled,
        channel: channel_name(info.widget_channel_id),
    };

    let roles = if options.includes(Section::Roles) || options.includes(Section::Channels) {
        guild.roles().await?
    } else {
        Vec::new()
    };

    let bans = if options.includes(Section::Bans) {
        guild
            .bans()
            .await?
            .into_iter()
            .map(|ban| BanRecord {
                id: ban.user_id.to_string(),
                reason: ban.reason,
            })
            .collect()
    } else {
        Vec::new()
    };

    let role_records = if options.includes(Section::Roles) {
        snapshot_roles(&roles, guild)
    } else {
        Vec::new()
    };

    let channel_tree = if options.includes(Section::Channels) {
        let threads = guild.active_threads().await?;
        snapshot_channels(&all_channels, &threads, &roles)?
    } else {
        ChannelTree::default()
    };

    let emojis = if options.includes(Section::Emojis) {
        guild
            .emojis()
            .await?
            .into_iter()
            .map(|emoji| EmojiRecord {
                name: emoji.name,
                url: emoji.url,
            })
            .collect()
    } else {
        Vec::new()
    };

    let snapshot = Snapshot {
        name: info.name.clone(),
        verification_level: Some(u8::from(info.verification_level)),
        explicit_content_filter: Some(u8::from(info.explicit_content_filter)),
        default_message_notifications: u8::from(info.default_message_notifications),
        afk,
        widget,
        channels: channel_tree,
        roles: role_records,
        emojis,
        bans,
        created_timestamp: chrono::Utc::now().timestamp_millis(),
        id: options.custom_id.clone().unwrap_or_else(snowflake::generate),
        guild_id: info.id.to_string(),
        icon_url: info.icon_url,
        splash_url: info.splash_url,
        banner_url: info.banner_url,
    };

    info!(
        "Backup {} created: {} roles, {} channels, {} emojis, {} bans",
        snapshot.id,
        snapshot.roles.len(),
        snapshot.channel_count(),
        snapshot.emojis.len(),
        snapshot.bans.len()
    );

    Ok(snapshot)
}

fn snapshot_roles(roles: &[RoleInfo], guild: &dyn GuildHandle) -> Vec<RoleRecord> {
    let everyone = guild.everyone_role();
    let mut sorted: Vec<&RoleInfo> = roles.iter().collect();
    sorted.sort_by_key(|r| (r.position, r.id));

    sorted
        .into_iter()
        .map(|role| RoleRecord {
            name: role.name.clone(),
            color: format!("#{:06x}", role.colour),
            hoist: role.hoist,
            permissions: role.permissions.bits().to_string(),
            position: role.position,
            mentionable: role.mentionable,
            everyone: role.id == everyone,
        })
        .collect()
}

fn snapshot_channels(
    all: &[ChannelInfo],
    threads: &[ChannelInfo],
    roles: &[RoleInfo],
) -> Result<ChannelTree> {
    let by_position =
        |a: &&ChannelInfo, b: &&ChannelInfo| (a.position, a.id).cmp(&(b.position, b.id));

    let mut categories: Vec<&ChannelInfo> = all
        .iter()
        .filter(|c| c.kind == ChannelType::Category)
        .collect();
    categories.sort_by(by_position);

    let mut tree = ChannelTree::default();

    for category in categories {
        let mut children: Vec<&ChannelInfo> = all
            .iter()
            .filter(|c| c.parent_id == Some(category.id) && !c.is_thread())
            .collect();
        children.sort_by(by_position);

        debug!(
            "Snapshotting category '{}' with {} channels",
            category.name,
            children.len()
        );

        tree.categories.push(CategoryRecord {
            name: category.name.clone(),
            permissions: super::permissions::extract(&category.permission_overwrites, roles),
            children: children
                .into_iter()
                .map(|c| channels::snapshot_channel(c, Some(&category.name), threads, roles))
                .collect::<Result<Vec<_>>>()?,
        });
    }

    let mut others: Vec<&ChannelInfo> = all
        .iter()
        .filter(|c| c.parent_id.is_none() && c.kind != ChannelType::Category && !c.is_thread())
        .collect();
    others.sort_by(by_position);

    tree.others = others
        .into_iter()
        .map(|c| channels::snapshot_channel(c, None, threads, roles))
        .collect::<Result<Vec<_>>>()?;

    Ok(tree)
}
