use futures::future::join_all;
use poise::serenity_prelude::{
    DefaultMessageNotificationLevel, ExplicitContentFilter, SystemChannelFlags, VerificationLevel,
};
use std::future::Future;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::platform::{GuildHandle, GuildSetting};

/// AFK timeout restored by a flush, in seconds
pub const DEFAULT_AFK_TIMEOUT: u16 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushCount {
    pub attempted: usize,
    pub failed: usize,
}

impl FlushCount {
    fn tally(results: &[bool]) -> Self {
        Self {
            attempted: results.len(),
            failed: results.iter().filter(|ok| !**ok).count(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed
    }
}

/// Outcome of a flush. Failures are counted, never raised.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub roles: FlushCount,
    pub channels: FlushCount,
    pub emojis: FlushCount,
    pub bans: FlushCount,
    pub webhooks: FlushCount,
    pub settings: FlushCount,
}

impl FlushSummary {
    pub fn failed(&self) -> usize {
        self.counts().iter().map(|(_, c)| c.failed).sum()
    }

    fn counts(&self) -> [(&'static str, FlushCount); 6] {
        [
            ("Roles", self.roles),
            ("Channels", self.channels),
            ("Emojis", self.emojis),
            ("Bans", self.bans),
            ("Webhooks", self.webhooks),
            ("Settings", self.settings),
        ]
    }

    /// Format the summary as a human-readable string
    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        for (label, count) in self.counts() {
            if count.attempted == 0 {
                continue;
            }
            if count.failed > 0 {
                lines.push(format!(
                    "**{}:** {} cleared, {} failed",
                    label,
                    count.succeeded(),
                    count.failed
                ));
            } else {
                lines.push(format!("**{}:** {} cleared", label, count.succeeded()));
            }
        }

        if lines.is_empty() {
            "Nothing to clear".to_string()
        } else {
            lines.join("\n")
        }
    }
}

async fn attempt<T>(label: String, op: impl Future<Output = Result<T>>) -> bool {
    match op.await {
        Ok(_) => {
            debug!("Flushed {}", label);
            true
        }
        Err(e) => {
            warn!("Failed to flush {}: {}", label, e);
            false
        }
    }
}

async fn list_or_empty<T>(what: &str, op: impl Future<Output = Result<Vec<T>>>) -> Vec<T> {
    op.await.unwrap_or_else(|e| {
        warn!("Failed to list {} for flush: {}", what, e);
        Vec::new()
    })
}

/// Best-effort teardown of everything an import recreates.
///
/// Every deletion and reset is attempted on its own; one failure never stops
/// the others. The default role and roles managed by an integration cannot be
/// deleted and are left in place.
pub async fn flush_guild(guild: &dyn GuildHandle) -> FlushSummary {
    info!("Flushing guild {}", guild.id());

    let everyone = guild.everyone_role();
    let (roles, channels, emojis, bans, webhooks) = futures::join!(
        list_or_empty("roles", guild.roles()),
        list_or_empty("channels", guild.channels()),
        list_or_empty("emojis", guild.emojis()),
        list_or_empty("bans", guild.bans()),
        list_or_empty("webhooks", guild.webhooks()),
    );

    let (roles, channels, emojis, bans, webhooks) = futures::join!(
        join_all(
            roles
                .iter()
                .filter(|r| r.id != everyone && !r.managed)
                .map(|r| attempt(format!("role '{}'", r.name), guild.delete_role(r.id))),
        ),
        join_all(
            channels
                .iter()
                .map(|c| attempt(format!("channel '{}'", c.name), guild.delete_channel(c.id))),
        ),
        join_all(
            emojis
                .iter()
                .map(|e| attempt(format!("emoji '{}'", e.name), guild.delete_emoji(e.id))),
        ),
        join_all(
            bans.iter()
                .map(|b| attempt(format!("ban of {}", b.user_id), guild.unban(b.user_id))),
        ),
        join_all(
            webhooks
                .iter()
                .map(|w| attempt(format!("webhook {}", w), guild.delete_webhook(*w))),
        ),
    );

    let settings = join_all(
        reset_settings(guild)
            .await
            .into_iter()
            .map(|s| attempt(format!("setting '{}'", s.label()), guild.apply(s))),
    )
    .await;

    let summary = FlushSummary {
        roles: FlushCount::tally(&roles),
        channels: FlushCount::tally(&channels),
        emojis: FlushCount::tally(&emojis),
        bans: FlushCount::tally(&bans),
        webhooks: FlushCount::tally(&webhooks),
        settings: FlushCount::tally(&settings),
    };

    info!(
        "Flushed guild {} ({} operations failed)",
        guild.id(),
        summary.failed()
    );
    summary
}

/// Settings restored after the entities are gone
async fn reset_settings(guild: &dyn GuildHandle) -> Vec<GuildSetting> {
    let mut settings = vec![
        GuildSetting::AfkChannel(None),
        GuildSetting::AfkTimeout(DEFAULT_AFK_TIMEOUT),
        GuildSetting::Icon(None),
        GuildSetting::Banner(None),
        GuildSetting::Splash(None),
        GuildSetting::DefaultMessageNotifications(DefaultMessageNotificationLevel::Mentions),
        GuildSetting::Widget {
            enabled: false,
            channel: None,
        },
        GuildSetting::SystemChannel(None),
        GuildSetting::SystemChannelFlags(
            SystemChannelFlags::SUPPRESS_JOIN_NOTIFICATIONS
                | SystemChannelFlags::SUPPRESS_PREMIUM_SUBSCRIPTIONS
                | SystemChannelFlags::SUPPRESS_GUILD_REMINDER_NOTIFICATIONS,
        ),
    ];

    // Community guilds reject both of these
    let community = match guild.info().await {
        Ok(info) => info.is_community(),
        Err(e) => {
            warn!("Could not read guild features, leaving content filter alone: {}", e);
            true
        }
    };
    if !community {
        settings.push(GuildSetting::ExplicitContentFilter(ExplicitContentFilter::None));
        settings.push(GuildSetting::VerificationLevel(VerificationLevel::None));
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockGuild;
    use crate::platform::FEATURE_COMMUNITY;
    use poise::serenity_prelude::{ChannelType, Permissions};

    fn populated() -> MockGuild {
        let guild = MockGuild::new(200);
        guild.with_role("Admin", 2, Permissions::ADMINISTRATOR);
        guild.with_role("Locked", 1, Permissions::empty());
        let cat = guild.with_channel("Text", ChannelType::Category, None, 0);
        guild.with_channel("general", ChannelType::Text, Some(cat), 0);
        guild.with_channel("random", ChannelType::Text, Some(cat), 1);
        guild.with_emoji("wave");
        guild.with_ban(1234, None);
        guild.with_webhook();
        guild
    }

    #[tokio::test]
    async fn test_flush_clears_everything() {
        let guild = populated();
        let summary = flush_guild(&guild).await;

        let state = guild.state();
        assert_eq!(state.roles.len(), 1);
        assert_eq!(state.roles[0].id, guild.everyone_role());
        assert!(state.channels.is_empty());
        assert!(state.emojis.is_empty());
        assert!(state.bans.is_empty());
        assert!(state.webhooks.is_empty());

        assert_eq!(summary.roles.attempted, 2);
        assert_eq!(summary.channels.attempted, 3);
        assert_eq!(summary.failed(), 0);
        assert!(state
            .settings
            .contains(&GuildSetting::AfkTimeout(DEFAULT_AFK_TIMEOUT)));
        assert!(state
            .settings
            .contains(&GuildSetting::VerificationLevel(VerificationLevel::None)));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let guild = populated();
        guild.fail_on("delete_role:Locked");
        guild.fail_on("delete_channel:general");
        guild.fail_on("webhooks");
        guild.fail_on("apply:icon");

        let summary = flush_guild(&guild).await;

        let state = guild.state();
        assert!(state.role_by_name("Locked").is_some());
        assert!(state.role_by_name("Admin").is_none());
        assert_eq!(state.channels.len(), 1);
        assert!(state.emojis.is_empty());
        assert!(state.bans.is_empty());
        // Listing failed, so nothing was attempted
        assert_eq!(state.webhooks.len(), 1);

        assert_eq!(summary.roles, FlushCount { attempted: 2, failed: 1 });
        assert_eq!(summary.channels, FlushCount { attempted: 3, failed: 1 });
        assert_eq!(summary.webhooks.attempted, 0);
        assert_eq!(summary.settings.failed, 1);
        assert_eq!(summary.failed(), 3);
        assert!(summary.format().contains("**Roles:** 1 cleared, 1 failed"));
        assert!(state.settings.contains(&GuildSetting::Widget {
            enabled: false,
            channel: None
        }));
    }

    #[tokio::test]
    async fn test_managed_roles_are_left_alone() {
        let guild = populated();
        let bot = guild.with_role("Helper Bot", 3, Permissions::empty());
        guild
            .state()
            .roles
            .iter_mut()
            .filter(|r| r.id == bot)
            .for_each(|r| r.managed = true);

        let summary = flush_guild(&guild).await;

        assert_eq!(summary.roles, FlushCount { attempted: 2, failed: 0 });
        let state = guild.state();
        assert!(state.role_by_name("Helper Bot").is_some());
        assert_eq!(state.roles.len(), 2);
    }

    #[tokio::test]
    async fn test_widget_channel_is_cleared() {
        let guild = populated();
        {
            let mut state = guild.state();
            state.info.widget_enabled = true;
            let general = state.channel_by_name("general").map(|c| c.id);
            state.info.widget_channel_id = general;
        }

        flush_guild(&guild).await;

        let state = guild.state();
        assert!(!state.info.widget_enabled);
        assert!(state.info.widget_channel_id.is_none());
    }

    #[tokio::test]
    async fn test_community_guard() {
        let guild = populated();
        guild.with_feature(FEATURE_COMMUNITY);

        flush_guild(&guild).await;

        let state = guild.state();
        assert!(!state
            .settings
            .iter()
            .any(|s| matches!(
                s,
                GuildSetting::VerificationLevel(_) | GuildSetting::ExplicitContentFilter(_)
            )));
        assert_eq!(state.count_calls("apply"), 9);
    }

    #[test]
    fn test_empty_summary_format() {
        assert_eq!(FlushSummary::default().format(), "Nothing to clear");
    }
}
