/// Administration and moderation
///
/// Holds the admin roster and privilege gate, the group registry, the
/// ban/mute/warning records, the audit trail and the coordinator that fans
/// moderation actions out to every group.

pub mod audit;
pub mod coordinator;
pub mod duration;
pub mod groups;
pub mod moderation;
pub mod roles;

pub use audit::{ActionType, AuditLog, AuditLogEntry};
pub use coordinator::{
    BanOutcome, FanOutOutcome, GroupFailure, ModerationCoordinator, MuteOutcome, WarnOutcome,
};
pub use groups::{normalize_group_id, GroupRecord, GroupRegistry};
pub use moderation::{BanRecord, ModerationStore, MuteRecord, PublicBan, WarningRecord};
pub use roles::{AdminManager, AdminRecord, Privilege, SENIOR_POINTS};
