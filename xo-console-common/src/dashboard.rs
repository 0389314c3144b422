//! Fleet-wide metrics shown on the dashboard overview

use std::collections::BTreeMap;

use crate::objects::{Host, Message, Task, Vm, XoObject};
use crate::plan;
use crate::quota::ResourceSet;
use crate::sr::{StorageRepository, is_sr_writable};

/// Number of SRs shown in the top usage chart
pub const DEFAULT_TOP_SR_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostMetrics {
    pub count: usize,
    pub cpus: u64,
    pub memory_total: u64,
    pub memory_usage: u64,
}

impl HostMetrics {
    pub fn compute<'a>(hosts: impl IntoIterator<Item = &'a Host>) -> Self {
        hosts.into_iter().fold(Self::default(), |mut metrics, host| {
            metrics.count += 1;
            metrics.cpus += host.cpus.cores;
            metrics.memory_total += host.memory.size;
            metrics.memory_usage += host.memory.usage;
            metrics
        })
    }

    pub fn memory_ratio(&self) -> f64 {
        if self.memory_total == 0 {
            return 0.0;
        }
        self.memory_usage as f64 / self.memory_total as f64
    }
}

/// Capacity summed over writable SRs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrMetrics {
    pub sr_total: i64,
    pub sr_usage: i64,
}

impl SrMetrics {
    pub fn compute<'a>(srs: impl IntoIterator<Item = &'a StorageRepository>) -> Self {
        srs.into_iter()
            .filter(|sr| is_sr_writable(sr))
            .fold(Self::default(), |mut metrics, sr| {
                metrics.sr_usage += sr.physical_usage;
                metrics.sr_total += sr.size;
                metrics
            })
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.sr_total <= 0 {
            return 0.0;
        }
        self.sr_usage as f64 / self.sr_total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmMetrics {
    /// vCPUs allocated to running VMs
    pub vcpus: u64,
    pub running: usize,
    pub halted: usize,
    pub other: usize,
}

impl VmMetrics {
    pub fn compute<'a>(vms: impl IntoIterator<Item = &'a Vm>) -> Self {
        vms.into_iter().fold(Self::default(), |mut metrics, vm| {
            if vm.is_running() {
                metrics.running += 1;
                metrics.vcpus += vm.cpus.number;
            } else if vm.is_halted() {
                metrics.halted += 1;
            } else {
                metrics.other += 1;
            }
            metrics
        })
    }

    pub fn total(&self) -> usize {
        self.running + self.halted + self.other
    }
}

/// One bar of the top SR usage chart
#[derive(Debug, Clone, PartialEq)]
pub struct SrUsage {
    pub id: String,
    pub name_label: String,
    pub ratio: f64,
}

/// Writable SRs with the highest usage ratio, highest first
pub fn top_writable_srs<'a>(
    srs: impl IntoIterator<Item = &'a StorageRepository>,
    n: usize,
) -> Vec<SrUsage> {
    let mut usages: Vec<SrUsage> = srs
        .into_iter()
        .filter(|sr| is_sr_writable(sr))
        .map(|sr| SrUsage {
            id: sr.id.clone(),
            name_label: sr.name_label.clone(),
            ratio: sr.usage_ratio(),
        })
        .collect();

    usages.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    usages.truncate(n);
    usages
}

/// Everything the default dashboard displays
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FleetOverview {
    pub n_pools: usize,
    pub n_hosts: usize,
    pub n_vms: usize,
    pub n_alarm_messages: usize,
    pub n_pending_tasks: usize,
    pub n_users: usize,
    pub host_metrics: HostMetrics,
    pub sr_metrics: SrMetrics,
    pub vm_metrics: VmMetrics,
    pub top_writable_srs: Vec<SrUsage>,
}

impl FleetOverview {
    /// Compute the overview from the object collection and the user count
    pub fn compute<'a>(
        objects: impl IntoIterator<Item = &'a XoObject>,
        n_users: usize,
        top_sr_count: usize,
    ) -> Self {
        let mut n_pools = 0;
        let mut hosts: Vec<&Host> = Vec::new();
        let mut vms: Vec<&Vm> = Vec::new();
        let mut srs: Vec<&StorageRepository> = Vec::new();
        let mut messages: Vec<&Message> = Vec::new();
        let mut tasks: Vec<&Task> = Vec::new();

        for object in objects {
            match object {
                XoObject::Pool(_) => n_pools += 1,
                XoObject::Host(host) => hosts.push(host),
                XoObject::Vm(vm) => vms.push(vm),
                XoObject::Sr(sr) => srs.push(sr),
                XoObject::Message(message) => messages.push(message),
                XoObject::Task(task) => tasks.push(task),
                XoObject::Other => {}
            }
        }

        Self {
            n_pools,
            n_hosts: hosts.len(),
            n_vms: vms.len(),
            n_alarm_messages: messages.iter().filter(|m| m.is_alarm()).count(),
            n_pending_tasks: tasks.iter().filter(|t| t.is_pending()).count(),
            n_users,
            host_metrics: HostMetrics::compute(hosts.iter().copied()),
            sr_metrics: SrMetrics::compute(srs.iter().copied()),
            vm_metrics: VmMetrics::compute(vms.iter().copied()),
            top_writable_srs: top_writable_srs(srs.iter().copied(), top_sr_count),
        }
    }
}

/// A host with patches waiting to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPatches {
    pub host_id: String,
    pub host_name: String,
    pub pool_name: String,
    pub missing: usize,
}

/// Ids of every host, sorted
pub fn host_ids<'a>(objects: impl IntoIterator<Item = &'a XoObject>) -> Vec<String> {
    let mut ids: Vec<String> = objects
        .into_iter()
        .filter_map(|object| match object {
            XoObject::Host(host) => Some(host.id.clone()),
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}

/// Hosts with at least one missing patch, ordered by pool then host name
///
/// `missing` maps host ids to their missing patch count. Hosts without a
/// count are left out.
pub fn hosts_with_missing_patches<'a>(
    objects: impl IntoIterator<Item = &'a XoObject>,
    missing: &BTreeMap<String, usize>,
) -> Vec<HostPatches> {
    let mut pools: BTreeMap<&str, &str> = BTreeMap::new();
    let mut hosts: Vec<&Host> = Vec::new();
    for object in objects {
        match object {
            XoObject::Pool(pool) => {
                pools.insert(&pool.id, &pool.name_label);
            }
            XoObject::Host(host) => hosts.push(host),
            _ => {}
        }
    }

    let mut patches: Vec<HostPatches> = hosts
        .into_iter()
        .filter_map(|host| {
            let count = *missing.get(&host.id)?;
            (count > 0).then(|| HostPatches {
                host_id: host.id.clone(),
                host_name: host.name_label.clone(),
                pool_name: pools
                    .get(host.pool.as_str())
                    .map_or_else(|| host.pool.clone(), |name| name.to_string()),
                missing: count,
            })
        })
        .collect();

    patches.sort_by(|a, b| {
        a.pool_name
            .cmp(&b.pool_name)
            .then_with(|| a.host_name.cmp(&b.host_name))
    });
    patches
}

/// Which variant of the overview the current user gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewMode {
    /// Plan does not include the dashboard
    Upgrade,
    NotEnoughPermissions,
    /// Per-resource-set quota cards
    ResourceSets,
    /// Fleet-wide metrics
    Default,
}

/// Decide which overview to render
pub fn overview_mode(
    plan_level: u8,
    is_admin: bool,
    permissions: &BTreeMap<String, serde_json::Value>,
    resource_sets: &[ResourceSet],
) -> OverviewMode {
    if !plan::can_view_dashboard(plan_level) {
        return OverviewMode::Upgrade;
    }

    let show_resource_sets = !resource_sets.is_empty() && !is_admin;
    let show_default = !permissions.is_empty() || is_admin;

    if show_resource_sets {
        OverviewMode::ResourceSets
    } else if show_default {
        OverviewMode::Default
    } else {
        OverviewMode::NotEnoughPermissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{HostCpus, HostMemory, Pool, VmCpus};
    use crate::sr::tests::sr;

    fn host(id: &str, cores: u64, size: u64, usage: u64) -> XoObject {
        XoObject::Host(Host {
            id: id.to_string(),
            name_label: id.to_string(),
            pool: "p1".to_string(),
            cpus: HostCpus { cores, sockets: 1 },
            memory: HostMemory { size, usage },
            power_state: "Running".to_string(),
        })
    }

    fn vm(id: &str, power_state: &str, vcpus: u64) -> XoObject {
        XoObject::Vm(Vm {
            id: id.to_string(),
            name_label: id.to_string(),
            pool: "p1".to_string(),
            power_state: power_state.to_string(),
            cpus: VmCpus {
                number: vcpus,
                max: vcpus,
            },
        })
    }

    fn sr_with_usage(id: &str, size: i64, usage: i64) -> StorageRepository {
        let mut sr = sr(id, "p1", "h1", false);
        sr.size = size;
        sr.physical_usage = usage;
        sr
    }

    #[test]
    fn test_fleet_overview() {
        let mut iso = sr_with_usage("iso", 100, 100);
        iso.content_type = "iso".to_string();

        let objects = vec![
            XoObject::Pool(Pool {
                id: "p1".to_string(),
                name_label: "pool".to_string(),
            }),
            host("h1", 8, 1000, 400),
            host("h2", 16, 3000, 600),
            vm("v1", "Running", 2),
            vm("v2", "Running", 4),
            vm("v3", "Halted", 8),
            vm("v4", "Suspended", 1),
            XoObject::Sr(sr_with_usage("s1", 100, 50)),
            XoObject::Sr(sr_with_usage("s2", 300, 30)),
            XoObject::Sr(iso),
            XoObject::Message(Message {
                id: "m1".to_string(),
                name: "ALARM".to_string(),
                object: None,
            }),
            XoObject::Message(Message {
                id: "m2".to_string(),
                name: "VM_STARTED".to_string(),
                object: None,
            }),
            XoObject::Task(Task {
                id: "t1".to_string(),
                name_label: "export".to_string(),
                status: "pending".to_string(),
            }),
            XoObject::Task(Task {
                id: "t2".to_string(),
                name_label: "import".to_string(),
                status: "success".to_string(),
            }),
            XoObject::Other,
        ];

        let overview = FleetOverview::compute(&objects, 3, DEFAULT_TOP_SR_COUNT);
        assert_eq!(overview.n_pools, 1);
        assert_eq!(overview.n_hosts, 2);
        assert_eq!(overview.n_vms, 4);
        assert_eq!(overview.n_alarm_messages, 1);
        assert_eq!(overview.n_pending_tasks, 1);
        assert_eq!(overview.n_users, 3);

        assert_eq!(overview.host_metrics.cpus, 24);
        assert_eq!(overview.host_metrics.memory_total, 4000);
        assert_eq!(overview.host_metrics.memory_usage, 1000);
        assert_eq!(overview.host_metrics.memory_ratio(), 0.25);

        assert_eq!(overview.vm_metrics.running, 2);
        assert_eq!(overview.vm_metrics.halted, 1);
        assert_eq!(overview.vm_metrics.other, 1);
        assert_eq!(overview.vm_metrics.vcpus, 6);
        assert_eq!(overview.vm_metrics.total(), 4);

        // ISO SR excluded from storage metrics
        assert_eq!(overview.sr_metrics.sr_total, 400);
        assert_eq!(overview.sr_metrics.sr_usage, 80);
        assert_eq!(overview.sr_metrics.usage_ratio(), 0.2);
    }

    #[test]
    fn test_top_writable_srs() {
        let srs: Vec<StorageRepository> = (1..=7)
            .map(|i| sr_with_usage(&format!("s{i}"), 100, i * 10))
            .chain(std::iter::once(sr_with_usage("unsized", -1, 0)))
            .collect();

        let top = top_writable_srs(&srs, 5);
        let ids: Vec<&str> = top.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["s7", "s6", "s5", "s4", "s3"]);
        assert_eq!(top[0].ratio, 0.7);

        assert!(top_writable_srs(&srs, 0).is_empty());
    }

    #[test]
    fn test_overview_mode() {
        let none = BTreeMap::new();
        let mut some = BTreeMap::new();
        some.insert("pool-1".to_string(), serde_json::json!({ "view": true }));
        let sets = vec![ResourceSet {
            id: "rs1".to_string(),
            name: "Team".to_string(),
            subjects: Vec::new(),
            objects: Vec::new(),
            limits: BTreeMap::new(),
        }];

        assert_eq!(overview_mode(plan::STARTER, true, &none, &[]), OverviewMode::Upgrade);
        assert_eq!(overview_mode(plan::SOURCES, true, &none, &sets), OverviewMode::Default);
        assert_eq!(overview_mode(plan::SOURCES, false, &none, &sets), OverviewMode::ResourceSets);
        assert_eq!(overview_mode(plan::SOURCES, false, &some, &[]), OverviewMode::Default);
        assert_eq!(
            overview_mode(plan::SOURCES, false, &none, &[]),
            OverviewMode::NotEnoughPermissions
        );
    }

    #[test]
    fn test_hosts_with_missing_patches() {
        let mut h3 = host("h3", 4, 0, 0);
        if let XoObject::Host(host) = &mut h3 {
            host.pool = "p0".to_string();
        }
        let objects = vec![
            XoObject::Pool(Pool {
                id: "p1".to_string(),
                name_label: "production".to_string(),
            }),
            host("h2", 4, 0, 0),
            host("h1", 4, 0, 0),
            host("up-to-date", 4, 0, 0),
            host("unchecked", 4, 0, 0),
            h3,
        ];
        let missing = BTreeMap::from([
            ("h1".to_string(), 3),
            ("h2".to_string(), 1),
            ("h3".to_string(), 7),
            ("up-to-date".to_string(), 0),
        ]);

        let patches = hosts_with_missing_patches(&objects, &missing);
        let listed: Vec<(&str, &str, usize)> = patches
            .iter()
            .map(|p| (p.pool_name.as_str(), p.host_name.as_str(), p.missing))
            .collect();
        // Unknown pools fall back to their id
        assert_eq!(
            listed,
            vec![("p0", "h3", 7), ("production", "h1", 3), ("production", "h2", 1)]
        );

        assert_eq!(
            host_ids(&objects),
            vec!["h1", "h2", "h3", "unchecked", "up-to-date"]
        );
    }
}
