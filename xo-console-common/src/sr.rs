//! Storage repositories and restore target compatibility

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::objects::null_as_default;

/// A storage repository as delivered by the object feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRepository {
    pub id: String,
    #[serde(default)]
    pub name_label: String,
    /// Pool the SR belongs to
    #[serde(rename = "$pool", default)]
    pub pool: String,
    /// Physical container (pool for shared SRs, host for local ones)
    #[serde(rename = "$container", default)]
    pub container: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub content_type: String,
    /// Capacity in bytes; the platform reports -1 for unsized SRs
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub physical_usage: i64,
}

impl StorageRepository {
    /// Fraction of the SR capacity in use, 0.0 for unsized SRs
    pub fn usage_ratio(&self) -> f64 {
        if self.size <= 0 {
            return 0.0;
        }
        self.physical_usage as f64 / self.size as f64
    }
}

/// Whether two SRs of the same pool can hold disks of the same VM
///
/// # Examples
/// ```
/// use xo_console_common::sr::{StorageRepository, are_srs_compatible};
///
/// let local = |id: &str, container: &str| StorageRepository {
///     id: id.into(),
///     name_label: id.into(),
///     pool: "pool".into(),
///     container: container.into(),
///     shared: false,
///     content_type: "user".into(),
///     size: 100,
///     physical_usage: 0,
/// };
/// assert!(are_srs_compatible(&local("a", "host1"), &local("b", "host1")));
/// assert!(!are_srs_compatible(&local("a", "host1"), &local("b", "host2")));
/// ```
pub fn are_srs_compatible(a: &StorageRepository, b: &StorageRepository) -> bool {
    a.shared || b.shared || a.container == b.container
}

/// Whether VM disks can be written to this SR
pub fn is_sr_writable(sr: &StorageRepository) -> bool {
    sr.content_type != "iso" && sr.size > 0
}

/// Whether `candidate` may receive one disk of a restore whose primary SR is
/// `default_sr`, given the per-disk selections already made
pub fn is_valid_secondary_sr(
    default_sr: &StorageRepository,
    candidate: &StorageRepository,
    map_vdis_srs: &BTreeMap<String, Option<StorageRepository>>,
) -> bool {
    candidate.id != default_sr.id
        && is_sr_writable(candidate)
        && default_sr.pool == candidate.pool
        && are_srs_compatible(default_sr, candidate)
        && map_vdis_srs
            .values()
            .all(|selected| match selected {
                Some(selected) => are_srs_compatible(selected, candidate),
                None => true,
            })
}
