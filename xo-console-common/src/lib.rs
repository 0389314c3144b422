// Shared view models and pure logic for the XO console

pub mod backup;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod format;
pub mod objects;
pub mod quota;
pub mod restore;
pub mod sr;
pub mod store;
pub mod subscription;
pub mod validation;

pub use backup::{
    Backup, BackupColumn, BackupDisk, BackupType, Remote, RemoteBackupInfo, RemoteTags,
    SortOrder, VmBackupSummary, aggregate_backups, sorted_summaries,
};
pub use cache::Memo;
pub use config::ConsoleConfig;
pub use dashboard::{
    FleetOverview, HostMetrics, HostPatches, OverviewMode, SrMetrics, SrUsage, VmMetrics,
};
pub use format::{format_bytes, format_size};
pub use objects::{Host, Message, Pool, Task, User, Vm, XoObject};
pub use quota::{Quota, ResourceKind, ResourceLimit, ResourceSet, ResourceSetQuotas};
pub use restore::{
    BackupApi, ImportRequest, RestoreAction, RestoreError, RestoreForm, RestoreOutcome,
    perform_restore, submit,
};
pub use sr::{StorageRepository, are_srs_compatible, is_sr_writable};
pub use store::{ObjectStore, Revisions, StoreChange};
pub use subscription::{Subscription, Topic};

/// XO JSON-RPC method names
pub mod methods {
    pub const SIGN_IN_WITH_TOKEN: &str = "session.signInWithToken";
    pub const SIGN_IN: &str = "session.signIn";
    pub const GET_ALL_OBJECTS: &str = "xo.getAllObjects";
    pub const GET_REMOTES: &str = "remote.getAll";
    pub const LIST_REMOTE_BACKUPS: &str = "backup.list";
    pub const IMPORT_BACKUP: &str = "backup.import";
    pub const IMPORT_DELTA_BACKUP: &str = "backup.importDeltaBackup";
    pub const START_VM: &str = "vm.start";
    pub const GET_USERS: &str = "user.getAll";
    pub const GET_PERMISSIONS: &str = "acl.getCurrentPermissions";
    pub const GET_RESOURCE_SETS: &str = "resourceSet.getAll";
    pub const LIST_MISSING_PATCHES: &str = "host.listMissingPatches";

    /// Server notification carrying object collection changes
    pub const NOTIFY_ALL: &str = "all";
}

/// Product plan levels gating console features
pub mod plan {
    pub const FREE: u8 = 1;
    pub const STARTER: u8 = 2;
    pub const ENTERPRISE: u8 = 3;
    pub const PREMIUM: u8 = 4;
    pub const SOURCES: u8 = 5;

    /// Restoring backups requires a plan above the free tier
    pub fn can_restore(plan: u8) -> bool {
        plan > FREE
    }

    /// The dashboard overview starts at the enterprise tier
    pub fn can_view_dashboard(plan: u8) -> bool {
        plan >= ENTERPRISE
    }
}

#[cfg(test)]
mod tests {
    use super::plan;

    #[test]
    fn test_plan_gating() {
        assert!(!plan::can_restore(plan::FREE));
        assert!(plan::can_restore(plan::STARTER));
        assert!(!plan::can_view_dashboard(plan::STARTER));
        assert!(plan::can_view_dashboard(plan::ENTERPRISE));
        assert!(plan::can_view_dashboard(plan::SOURCES));
    }
}
