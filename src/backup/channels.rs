use poise::serenity_prelude::ChannelType;

use super::permissions;
use crate::error::{BackupError, Result};
use crate::platform::{ChannelInfo, RoleInfo};
use crate::snapshot::{ChannelRecord, TextChannelRecord, ThreadRecord, VoiceChannelRecord};

/// Auto-archive duration used when the platform does not report one (one day)
pub const DEFAULT_AUTO_ARCHIVE_MINUTES: u16 = 1440;

/// Bitrate recorded when a voice channel does not report one
const DEFAULT_BITRATE: u32 = 64_000;

pub fn is_text_like(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::News)
}

pub fn is_voice_like(kind: ChannelType) -> bool {
    kind == ChannelType::Voice
}

/// Snapshot a text or announcement channel together with its active threads
pub fn snapshot_text(
    channel: &ChannelInfo,
    parent: Option<&str>,
    threads: &[ChannelInfo],
    roles: &[RoleInfo],
) -> TextChannelRecord {
    let mut own_threads: Vec<&ChannelInfo> = threads
        .iter()
        .filter(|t| t.parent_id == Some(channel.id))
        .collect();
    own_threads.sort_by_key(|t| t.id);

    TextChannelRecord {
        name: channel.name.clone(),
        parent: parent.map(str::to_string),
        permissions: permissions::extract(&channel.permission_overwrites, roles),
        topic: channel.topic.clone(),
        // Slow mode only applies to standard text channels
        rate_limit_per_user: if channel.kind == ChannelType::Text {
            channel.rate_limit_per_user
        } else {
            None
        },
        nsfw: channel.nsfw,
        news: channel.kind == ChannelType::News,
        threads: own_threads.into_iter().map(snapshot_thread).collect(),
        messages: Vec::new(),
    }
}

fn snapshot_thread(thread: &ChannelInfo) -> ThreadRecord {
    let meta = thread.thread.as_ref();
    ThreadRecord {
        name: thread.name.clone(),
        archived: meta.map(|m| m.archived).unwrap_or(false),
        locked: meta.map(|m| m.locked).unwrap_or(false),
        rate_limit_per_user: thread.rate_limit_per_user,
        auto_archive_duration: meta
            .and_then(|m| m.auto_archive_duration)
            .unwrap_or(DEFAULT_AUTO_ARCHIVE_MINUTES),
        messages: Vec::new(),
    }
}

pub fn snapshot_voice(
    channel: &ChannelInfo,
    parent: Option<&str>,
    roles: &[RoleInfo],
) -> VoiceChannelRecord {
    VoiceChannelRecord {
        name: channel.name.clone(),
        parent: parent.map(str::to_string),
        permissions: permissions::extract(&channel.permission_overwrites, roles),
        users_limit: channel.user_limit.unwrap_or(0),
        bitrate: channel.bitrate.unwrap_or(DEFAULT_BITRATE),
    }
}

/// Snapshot any channel, failing on kinds the snapshot format cannot hold
pub fn snapshot_channel(
    channel: &ChannelInfo,
    parent: Option<&str>,
    threads: &[ChannelInfo],
    roles: &[RoleInfo],
) -> Result<ChannelRecord> {
    if is_text_like(channel.kind) {
        Ok(ChannelRecord::Text(snapshot_text(channel, parent, threads, roles)))
    } else if is_voice_like(channel.kind) {
        Ok(ChannelRecord::Voice(snapshot_voice(channel, parent, roles)))
    } else {
        Err(BackupError::UnsupportedChannel {
            name: channel.name.clone(),
            kind: format!("{:?}", channel.kind),
        })
    }
}
