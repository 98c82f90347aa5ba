use poise::serenity_prelude::{PermissionOverwrite, PermissionOverwriteType, Permissions};
use tracing::debug;

use crate::error::Result;
use crate::platform::RoleInfo;
use crate::snapshot::{parse_bits, PermissionRecord};

/// Convert a channel's role overwrites into name-keyed records.
///
/// Member overwrites are not portable and are skipped, as are overwrites for
/// roles that no longer exist on the guild.
pub fn extract(overwrites: &[PermissionOverwrite], roles: &[RoleInfo]) -> Vec<PermissionRecord> {
    overwrites
        .iter()
        .filter_map(|overwrite| {
            let PermissionOverwriteType::Role(role_id) = overwrite.kind else {
                return None;
            };
            let role = roles.iter().find(|r| r.id == role_id)?;
            Some(PermissionRecord {
                role: role.name.clone(),
                allow: overwrite.allow.bits().to_string(),
                deny: overwrite.deny.bits().to_string(),
            })
        })
        .collect()
}

/// Turn name-keyed records back into overwrites for the target's current roles.
///
/// Records naming a role that does not exist are dropped. When several roles
/// share a name, the lowest one wins.
pub fn resolve(
    records: &[PermissionRecord],
    roles: &[RoleInfo],
) -> Result<Vec<PermissionOverwrite>> {
    let mut overwrites = Vec::with_capacity(records.len());

    for record in records {
        let Some(role) = roles
            .iter()
            .filter(|r| r.name == record.role)
            .min_by_key(|r| r.position)
        else {
            debug!("Dropping overwrite for unknown role '{}'", record.role);
            continue;
        };

        overwrites.push(PermissionOverwrite {
            allow: Permissions::from_bits_retain(parse_bits(&record.allow, &record.role)?),
            deny: Permissions::from_bits_retain(parse_bits(&record.deny, &record.role)?),
            kind: PermissionOverwriteType::Role(role.id),
        });
    }

    Ok(overwrites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::{RoleId, UserId};

    fn role(id: u64, name: &str, position: u16) -> RoleInfo {
        RoleInfo {
            id: RoleId::new(id),
            name: name.to_string(),
            colour: 0,
            hoist: false,
            mentionable: false,
            managed: false,
            position,
            permissions: Permissions::empty(),
        }
    }

    #[test]
    fn test_extract_keeps_known_role_overwrites() {
        let roles = vec![role(1, "@everyone", 0), role(2, "Member", 1)];
        let overwrites = vec![
            PermissionOverwrite {
                allow: Permissions::VIEW_CHANNEL,
                deny: Permissions::SEND_MESSAGES,
                kind: PermissionOverwriteType::Role(RoleId::new(2)),
            },
            PermissionOverwrite {
                allow: Permissions::all(),
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(UserId::new(99)),
            },
            PermissionOverwrite {
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
                kind: PermissionOverwriteType::Role(RoleId::new(77)),
            },
        ];

        let records = extract(&overwrites, &roles);
        assert_eq!(
            records,
            vec![PermissionRecord {
                role: "Member".to_string(),
                allow: "1024".to_string(),
                deny: "2048".to_string(),
            }]
        );
    }

    #[test]
    fn test_resolve_drops_unknown_roles() {
        let roles = vec![role(1, "@everyone", 0), role(2, "Member", 1)];
        let records = vec![
            PermissionRecord {
                role: "Ghost".to_string(),
                allow: "1024".to_string(),
                deny: "0".to_string(),
            },
            PermissionRecord {
                role: "@everyone".to_string(),
                allow: "0".to_string(),
                deny: "1024".to_string(),
            },
        ];

        let overwrites = resolve(&records, &roles).unwrap();
        assert_eq!(overwrites.len(), 1);
        assert_eq!(overwrites[0].kind, PermissionOverwriteType::Role(RoleId::new(1)));
        assert_eq!(overwrites[0].deny, Permissions::VIEW_CHANNEL);
    }

    #[test]
    fn test_resolve_prefers_lowest_duplicate() {
        let roles = vec![role(5, "Mod", 4), role(6, "Mod", 2)];
        let records = vec![PermissionRecord {
            role: "Mod".to_string(),
            allow: "8192".to_string(),
            deny: "0".to_string(),
        }];

        let overwrites = resolve(&records, &roles).unwrap();
        assert_eq!(overwrites[0].kind, PermissionOverwriteType::Role(RoleId::new(6)));
        assert_eq!(overwrites[0].allow, Permissions::MANAGE_MESSAGES);
    }

    #[test]
    fn test_resolve_keeps_unknown_bits() {
        let roles = vec![role(2, "Member", 1)];
        let bits = (1u64 << 55) | 1024;
        let records = vec![PermissionRecord {
            role: "Member".to_string(),
            allow: bits.to_string(),
            deny: (1u64 << 60).to_string(),
        }];

        let overwrites = resolve(&records, &roles).unwrap();
        assert_eq!(overwrites[0].allow.bits(), bits);
        assert_eq!(overwrites[0].deny.bits(), 1u64 << 60);
    }

    #[test]
    fn test_resolve_rejects_garbage_bits() {
        let roles = vec![role(2, "Member", 1)];
        let records = vec![PermissionRecord {
            role: "Member".to_string(),
            allow: "-1".to_string(),
            deny: "0".to_string(),
        }];
        assert!(resolve(&records, &roles).is_err());
    }
}
