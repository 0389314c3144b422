//! Resource set quotas
//!
//! Self-service users see one card per resource set, each showing how much
//! of the disk, memory and vCPU allowance is consumed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::format::format_size;

/// Kind of resource limited by a resource set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Disk,
    Memory,
    Cpus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Disk, ResourceKind::Memory, ResourceKind::Cpus];

    /// Key of this kind in a resource set's `limits` map
    pub fn key(self) -> &'static str {
        match self {
            ResourceKind::Disk => "disk",
            ResourceKind::Memory => "memory",
            ResourceKind::Cpus => "cpus",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ResourceKind::Disk => "Disk",
            ResourceKind::Memory => "Memory",
            ResourceKind::Cpus => "CPUs",
        }
    }

    /// Format an amount of this resource for display
    pub fn format_amount(self, amount: i64) -> String {
        match self {
            ResourceKind::Cpus => amount.to_string(),
            ResourceKind::Disk | ResourceKind::Memory => format_size(amount),
        }
    }
}

/// Raw limit of a resource set, as stored on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceLimit {
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub total: i64,
}

/// An admin-defined quota grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub limits: BTreeMap<String, ResourceLimit>,
}

/// Quota usage of one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quota {
    pub available: i64,
    pub total: i64,
    /// `total - available`
    pub usage: i64,
}

impl Quota {
    pub fn from_limit(limit: &ResourceLimit) -> Self {
        Self {
            available: limit.available,
            total: limit.total,
            usage: limit.total - limit.available,
        }
    }

    /// Calculate usage ratio (0.0-1.0), 0.0 when no total is set
    pub fn usage_ratio(&self) -> f64 {
        if self.total <= 0 {
            return 0.0;
        }
        // Over-consumed sets report a negative `available`
        (self.usage as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    /// e.g. `Used: 40 (Total: 50)`
    pub fn describe(&self, kind: ResourceKind) -> String {
        format!(
            "Used: {} (Total: {})",
            kind.format_amount(self.usage),
            kind.format_amount(self.total)
        )
    }
}

/// Quotas of every resource kind for one resource set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSetQuotas {
    pub disk: Quota,
    pub memory: Quota,
    pub cpus: Quota,
}

impl ResourceSetQuotas {
    /// Compute quotas, defaulting missing kinds to zeros
    pub fn from_limits(limits: &BTreeMap<String, ResourceLimit>) -> Self {
        let quota = |kind: ResourceKind| {
            limits
                .get(kind.key())
                .map(Quota::from_limit)
                .unwrap_or_default()
        };

        Self {
            disk: quota(ResourceKind::Disk),
            memory: quota(ResourceKind::Memory),
            cpus: quota(ResourceKind::Cpus),
        }
    }

    pub fn get(&self, kind: ResourceKind) -> &Quota {
        match kind {
            ResourceKind::Disk => &self.disk,
            ResourceKind::Memory => &self.memory,
            ResourceKind::Cpus => &self.cpus,
        }
    }
}

impl ResourceSet {
    pub fn quotas(&self) -> ResourceSetQuotas {
        ResourceSetQuotas::from_limits(&self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_usage_from_limits() {
        let mut limits = BTreeMap::new();
        limits.insert(
            "disk".to_string(),
            ResourceLimit {
                available: 10,
                total: 50,
            },
        );

        let quotas = ResourceSetQuotas::from_limits(&limits);
        assert_eq!(quotas.disk.usage, 40);
        assert_eq!(quotas.disk.available, 10);
        assert_eq!(quotas.disk.total, 50);
        assert_eq!(quotas.memory, Quota::default());
        assert_eq!(quotas.cpus, Quota::default());
    }

    #[test]
    fn test_usage_ratio() {
        let quota = Quota::from_limit(&ResourceLimit {
            available: 25,
            total: 100,
        });
        assert_eq!(quota.usage_ratio(), 0.75);
        assert_eq!(Quota::default().usage_ratio(), 0.0);

        let over = Quota::from_limit(&ResourceLimit {
            available: -20,
            total: 100,
        });
        assert_eq!(over.usage, 120);
        assert_eq!(over.usage_ratio(), 1.0);
    }

    #[test]
    fn test_describe() {
        let cpus = Quota::from_limit(&ResourceLimit {
            available: 2,
            total: 8,
        });
        assert_eq!(cpus.describe(ResourceKind::Cpus), "Used: 6 (Total: 8)");

        let memory = Quota::from_limit(&ResourceLimit {
            available: 1024,
            total: 4096,
        });
        assert_eq!(
            memory.describe(ResourceKind::Memory),
            "Used: 3.00 KiB (Total: 4.00 KiB)"
        );
    }

    #[test]
    fn test_parse_resource_set() {
        let json = r#"{
            "id": "rs1",
            "name": "Team A",
            "subjects": ["u1"],
            "objects": ["sr1"],
            "limits": {
                "cpus": { "available": 4, "total": 8 },
                "memory": { "available": 1073741824, "total": 4294967296 }
            }
        }"#;

        let set: ResourceSet = serde_json::from_str(json).unwrap();
        let quotas = set.quotas();
        assert_eq!(quotas.get(ResourceKind::Cpus).usage, 4);
        assert_eq!(quotas.get(ResourceKind::Memory).usage, 3221225472);
        assert_eq!(quotas.get(ResourceKind::Disk).total, 0);
    }
}
