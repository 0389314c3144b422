//! Backup records and per-VM aggregation
//!
//! Every enabled remote returns its own backup catalog. The catalogs are
//! flattened into [`Backup`] records and grouped by VM name into
//! [`VmBackupSummary`] values, recomputed wholesale on each refresh.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::format::format_backup_date;

/// Kind of backup stored on a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Full single-file export
    Xva,
    /// Incremental backup referencing per-disk deltas
    Delta,
}

/// A configured backup storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remote {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A disk referenced by a delta backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDisk {
    #[serde(alias = "id")]
    pub uuid: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(default)]
    pub virtual_size: Option<u64>,
}

impl BackupDisk {
    pub fn display_name(&self) -> &str {
        if self.name_label.is_empty() {
            &self.uuid
        } else {
            &self.name_label
        }
    }
}

/// One entry of a remote's backup catalog, as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteBackupInfo {
    /// Seconds since the epoch
    pub datetime: i64,
    #[serde(default)]
    pub disks: Vec<BackupDisk>,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// A backup record ready for display and import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    /// Milliseconds since the epoch
    pub date: i64,
    /// Name of the backed up VM
    pub name: String,
    pub remote_id: String,
    pub remote_name: String,
    pub tag: String,
    pub backup_type: BackupType,
    /// File (xva) or delta base path on the remote
    pub path: String,
    /// VM uuid, delta backups only
    pub id: Option<String>,
    /// Disks of the backup, delta backups only
    pub vdis: Vec<BackupDisk>,
}

impl Backup {
    /// Build a backup record from a remote catalog entry
    ///
    /// Delta backups are addressed by their metadata path without its final
    /// extension; full backups by the file id itself.
    pub fn from_remote_info(remote: &Remote, info: &RemoteBackupInfo) -> Self {
        let mut backup = Self {
            date: info.datetime.saturating_mul(1000),
            name: info.name.clone(),
            remote_id: remote.id.clone(),
            remote_name: remote.name.clone(),
            tag: info.tag.clone(),
            backup_type: info.backup_type,
            path: info.id.clone(),
            id: None,
            vdis: Vec::new(),
        };

        if info.backup_type == BackupType::Delta {
            backup.path = strip_extension(&info.id).to_string();
            backup.id = info.uuid.clone();
            backup.vdis = info.disks.clone();
        }

        backup
    }

    pub fn is_delta(&self) -> bool {
        self.backup_type == BackupType::Delta
    }

    /// Label used when picking a backup to restore, e.g.
    /// `[delta] daily - nfs (March 3, 2017, 10:00:00)`
    pub fn option_label(&self) -> String {
        let prefix = if self.is_delta() { "[delta] " } else { "" };
        format!(
            "{prefix}{} - {} ({})",
            self.tag,
            self.remote_name,
            format_backup_date(self.date)
        )
    }
}

fn strip_extension(id: &str) -> &str {
    match id.rsplit_once('.') {
        Some((base, _)) => base,
        None => id,
    }
}

/// Tags found for one VM on one remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTags {
    pub remote_name: String,
    /// Distinct tags, in first-seen order
    pub tags: Vec<String>,
}

/// All backups of a single VM across every remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmBackupSummary {
    pub backups: Vec<Backup>,
    /// Most recent backup by date
    pub last: Backup,
    /// Remote id -> tags present on that remote
    pub tags_by_remote: BTreeMap<String, RemoteTags>,
    pub simple_count: usize,
    pub delta_count: usize,
}

impl VmBackupSummary {
    /// Summarize a non-empty list of backups of the same VM
    pub fn from_backups(backups: Vec<Backup>) -> Option<Self> {
        let mut iter = backups.iter();
        let mut last = iter.next()?;
        for backup in iter {
            if backup.date > last.date {
                last = backup;
            }
        }
        let last = last.clone();

        let mut tags_by_remote: BTreeMap<String, RemoteTags> = BTreeMap::new();
        for backup in &backups {
            let entry = tags_by_remote
                .entry(backup.remote_id.clone())
                .or_insert_with(|| RemoteTags {
                    remote_name: backup.remote_name.clone(),
                    tags: Vec::new(),
                });
            if !entry.tags.contains(&backup.tag) {
                entry.tags.push(backup.tag.clone());
            }
        }

        let simple_count = backups
            .iter()
            .filter(|b| b.backup_type == BackupType::Xva)
            .count();
        let delta_count = backups
            .iter()
            .filter(|b| b.backup_type == BackupType::Delta)
            .count();

        Some(Self {
            backups,
            last,
            tags_by_remote,
            simple_count,
            delta_count,
        })
    }

    /// Name of the VM these backups belong to
    pub fn vm_name(&self) -> &str {
        &self.last.name
    }

    /// Backups ordered newest first, as offered in the restore dialog
    pub fn backups_newest_first(&self) -> Vec<&Backup> {
        let mut backups: Vec<&Backup> = self.backups.iter().collect();
        backups.sort_by(|a, b| b.date.cmp(&a.date));
        backups
    }

    /// e.g. `Simple 2, Delta 1`
    pub fn available_backups_label(&self) -> String {
        available_backups_label(self.simple_count, self.delta_count)
    }
}

/// Describe backup counts by type, omitting empty kinds
///
/// # Examples
/// ```
/// use xo_console_common::backup::available_backups_label;
/// assert_eq!(available_backups_label(2, 1), "Simple 2, Delta 1");
/// assert_eq!(available_backups_label(0, 3), "Delta 3");
/// ```
pub fn available_backups_label(simple_count: usize, delta_count: usize) -> String {
    let mut parts = Vec::with_capacity(2);
    if simple_count > 0 {
        parts.push(format!("Simple {simple_count}"));
    }
    if delta_count > 0 {
        parts.push(format!("Delta {delta_count}"));
    }
    parts.join(", ")
}

/// Merge the catalogs of several remotes into per-VM summaries keyed by VM name
pub fn aggregate_backups(
    listings: &[(Remote, Vec<RemoteBackupInfo>)],
) -> BTreeMap<String, VmBackupSummary> {
    let mut by_vm: BTreeMap<String, Vec<Backup>> = BTreeMap::new();

    for (remote, infos) in listings {
        for info in infos {
            let backup = Backup::from_remote_info(remote, info);
            by_vm.entry(backup.name.clone()).or_default().push(backup);
        }
    }

    by_vm
        .into_iter()
        .filter_map(|(vm, backups)| VmBackupSummary::from_backups(backups).map(|s| (vm, s)))
        .collect()
}

/// Sortable columns of the backup table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackupColumn {
    VmName,
    #[default]
    LastBackup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Order summaries for display; ties fall back to VM name
pub fn sorted_summaries(
    summaries: &BTreeMap<String, VmBackupSummary>,
    column: BackupColumn,
    order: SortOrder,
) -> Vec<&VmBackupSummary> {
    let mut rows: Vec<&VmBackupSummary> = summaries.values().collect();
    rows.sort_by(|a, b| {
        let ordering = match column {
            BackupColumn::VmName => a.vm_name().cmp(b.vm_name()),
            BackupColumn::LastBackup => a.last.date.cmp(&b.last.date),
        };
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering == Ordering::Equal {
            a.vm_name().cmp(b.vm_name())
        } else {
            ordering
        }
    });
    rows
}

/// Keep only summaries whose VM name contains `query` (case-insensitive)
pub fn filter_summaries<'a>(
    rows: Vec<&'a VmBackupSummary>,
    query: &str,
) -> Vec<&'a VmBackupSummary> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|s| s.vm_name().to_lowercase().contains(&query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str, name: &str) -> Remote {
        Remote {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("nfs://backup/{id}"),
            enabled: true,
        }
    }

    fn info(name: &str, backup_type: BackupType, datetime: i64, tag: &str) -> RemoteBackupInfo {
        let id = match backup_type {
            BackupType::Xva => format!("{datetime}_{tag}_{name}.xva"),
            BackupType::Delta => format!("vm_delta_{tag}_{name}/{datetime}_{name}.json"),
        };
        RemoteBackupInfo {
            datetime,
            disks: Vec::new(),
            id,
            name: name.to_string(),
            tag: tag.to_string(),
            backup_type,
            uuid: Some(format!("uuid-{name}")),
        }
    }

    #[test]
    fn test_xva_record_uses_file_id_as_path() {
        let backup = Backup::from_remote_info(
            &remote("r1", "nfs"),
            &info("db1", BackupType::Xva, 100, "daily"),
        );
        assert_eq!(backup.date, 100_000);
        assert_eq!(backup.path, "100_daily_db1.xva");
        assert_eq!(backup.id, None);
        assert!(backup.vdis.is_empty());
    }

    #[test]
    fn test_delta_record_strips_extension_and_keeps_disks() {
        let mut delta = info("db1", BackupType::Delta, 200, "hourly");
        delta.disks = vec![BackupDisk {
            uuid: "vdi-1".to_string(),
            name_label: "root".to_string(),
            virtual_size: Some(1024),
        }];

        let backup = Backup::from_remote_info(&remote("r2", "smb"), &delta);
        assert_eq!(backup.path, "vm_delta_hourly_db1/200_db1");
        assert_eq!(backup.id.as_deref(), Some("uuid-db1"));
        assert_eq!(backup.vdis.len(), 1);
        assert_eq!(backup.remote_name, "smb");
    }

    #[test]
    fn test_delta_path_without_extension_is_kept() {
        assert_eq!(strip_extension("no-extension"), "no-extension");
        assert_eq!(strip_extension("a.b/c.json"), "a.b/c");
    }

    #[test]
    fn test_two_remotes_example() {
        let listings = vec![
            (remote("r1", "nfs"), vec![info("db1", BackupType::Xva, 100, "daily")]),
            (remote("r2", "smb"), vec![info("db1", BackupType::Delta, 200, "hourly")]),
        ];

        let summaries = aggregate_backups(&listings);
        let db1 = &summaries["db1"];
        assert_eq!(db1.last.date, 200_000);
        assert_eq!(db1.simple_count, 1);
        assert_eq!(db1.delta_count, 1);
        assert_eq!(db1.tags_by_remote.len(), 2);
        assert_eq!(db1.tags_by_remote["r1"].remote_name, "nfs");
        assert_eq!(db1.tags_by_remote["r2"].tags, vec!["hourly".to_string()]);
    }

    #[test]
    fn test_aggregation_properties() {
        let listings = vec![
            (
                remote("r1", "nfs"),
                vec![
                    info("web", BackupType::Xva, 10, "daily"),
                    info("web", BackupType::Xva, 30, "daily"),
                    info("db", BackupType::Delta, 20, "hourly"),
                    info("web", BackupType::Delta, 25, "weekly"),
                ],
            ),
            (
                remote("r2", "smb"),
                vec![
                    info("web", BackupType::Xva, 5, "monthly"),
                    info("db", BackupType::Xva, 40, "daily"),
                ],
            ),
            (remote("r3", "empty"), Vec::new()),
        ];

        let summaries = aggregate_backups(&listings);
        assert_eq!(summaries.len(), 2);

        for summary in summaries.values() {
            let max_date = summary.backups.iter().map(|b| b.date).max().unwrap();
            assert_eq!(summary.last.date, max_date);
            assert_eq!(summary.simple_count + summary.delta_count, summary.backups.len());

            let mut remote_ids: Vec<&str> =
                summary.backups.iter().map(|b| b.remote_id.as_str()).collect();
            remote_ids.sort();
            remote_ids.dedup();
            let keys: Vec<&str> = summary.tags_by_remote.keys().map(String::as_str).collect();
            assert_eq!(keys, remote_ids);
        }

        // Tags are de-duplicated per remote
        assert_eq!(
            summaries["web"].tags_by_remote["r1"].tags,
            vec!["daily".to_string(), "weekly".to_string()]
        );
    }

    #[test]
    fn test_last_keeps_first_on_equal_dates() {
        let listings = vec![(
            remote("r1", "nfs"),
            vec![
                info("vm", BackupType::Xva, 50, "first"),
                info("vm", BackupType::Xva, 50, "second"),
            ],
        )];
        let summaries = aggregate_backups(&listings);
        assert_eq!(summaries["vm"].last.tag, "first");
    }

    #[test]
    fn test_default_sort_is_most_recent_first() {
        let listings = vec![(
            remote("r1", "nfs"),
            vec![
                info("alpha", BackupType::Xva, 10, "daily"),
                info("beta", BackupType::Xva, 30, "daily"),
                info("gamma", BackupType::Xva, 20, "daily"),
            ],
        )];
        let summaries = aggregate_backups(&listings);

        let rows = sorted_summaries(&summaries, BackupColumn::default(), SortOrder::default());
        let names: Vec<&str> = rows.iter().map(|s| s.vm_name()).collect();
        assert_eq!(names, vec!["beta", "gamma", "alpha"]);

        let rows = sorted_summaries(&summaries, BackupColumn::VmName, SortOrder::Ascending);
        let names: Vec<&str> = rows.iter().map(|s| s.vm_name()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_filter_summaries() {
        let listings = vec![(
            remote("r1", "nfs"),
            vec![
                info("Web-01", BackupType::Xva, 10, "daily"),
                info("db-01", BackupType::Xva, 30, "daily"),
            ],
        )];
        let summaries = aggregate_backups(&listings);
        let rows = sorted_summaries(&summaries, BackupColumn::VmName, SortOrder::Ascending);

        let filtered = filter_summaries(rows.clone(), "web");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].vm_name(), "Web-01");
        assert_eq!(filter_summaries(rows, "  ").len(), 2);
    }

    #[test]
    fn test_available_backups_label() {
        assert_eq!(available_backups_label(0, 0), "");
        assert_eq!(available_backups_label(3, 0), "Simple 3");
    }

    #[test]
    fn test_parse_remote_listing() {
        let json = r#"[
            {"datetime": 1488535200, "id": "20170303T100000Z_daily_db1.xva",
             "name": "db1", "tag": "daily", "type": "xva"},
            {"datetime": 1488538800, "id": "vm_delta_hourly_x/20170303T110000Z_db1.json",
             "name": "db1", "tag": "hourly", "type": "delta", "uuid": "u1",
             "disks": [{"uuid": "d1", "name_label": "root"}]}
        ]"#;
        let infos: Vec<RemoteBackupInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].backup_type, BackupType::Delta);
        assert_eq!(infos[1].disks[0].display_name(), "root");
    }

    #[test]
    fn test_option_label() {
        let backup = Backup::from_remote_info(
            &remote("r1", "nfs"),
            &info("db1", BackupType::Delta, 100, "hourly"),
        );
        let label = backup.option_label();
        assert!(label.starts_with("[delta] hourly - nfs ("));
    }
}
