//! Concurrent listing of the backups stored on every enabled remote
//!
//! Every run first refreshes the remote list, then issues one `backup.list`
//! call per enabled remote on the rayon pool; results are joined and
//! aggregated per VM. A remote that fails to answer is logged and
//! contributes nothing.

use rayon::prelude::*;
use std::cell::Cell;
use std::collections::BTreeMap;
use xo_console_common::{Remote, RemoteBackupInfo, VmBackupSummary, aggregate_backups};

/// Source of remote backup catalogs
pub trait BackupLister {
    fn list_remotes(&self) -> anyhow::Result<Vec<Remote>>;

    fn list_backups(&self, remote_id: &str) -> anyhow::Result<Vec<RemoteBackupInfo>>;
}

/// Result of one listing run
#[derive(Debug, Clone)]
pub struct RemoteListing {
    pub generation: u64,
    /// Every remote, enabled or not; `None` when the fetch failed
    pub fetched_remotes: Option<Vec<Remote>>,
    /// Enabled remotes whose backups were listed
    pub listed_remotes: Vec<Remote>,
    pub summaries: BTreeMap<String, VmBackupSummary>,
}

impl RemoteListing {
    /// Fetch the current remotes, then list the backups of the enabled ones
    ///
    /// `known` is used when the remote list cannot be fetched.
    pub fn fetch<L>(lister: &L, generation: u64, known: &[Remote]) -> Self
    where
        L: BackupLister + Sync,
    {
        let fetched_remotes = lister
            .list_remotes()
            .inspect_err(|e| log::warn!("Failed to refresh remotes, using the known ones: {e:#}"))
            .ok();
        let listed_remotes: Vec<Remote> = fetched_remotes
            .as_deref()
            .unwrap_or(known)
            .iter()
            .filter(|remote| remote.enabled)
            .cloned()
            .collect();
        let summaries = list_remote_backups(lister, &listed_remotes);

        Self {
            generation,
            fetched_remotes,
            listed_remotes,
            summaries,
        }
    }
}

/// Whether the enabled remotes moved away from those behind the shown listing
pub fn needs_relisting(listed: &[Remote], enabled: &[Remote]) -> bool {
    listed != enabled
}

/// List and aggregate the backups of every enabled remote
pub fn list_remote_backups<L>(lister: &L, remotes: &[Remote]) -> BTreeMap<String, VmBackupSummary>
where
    L: BackupLister + Sync,
{
    let listings: Vec<(Remote, Vec<RemoteBackupInfo>)> = remotes
        .par_iter()
        .filter(|remote| remote.enabled)
        .map(|remote| match lister.list_backups(&remote.id) {
            Ok(infos) => {
                log::debug!("Remote {} holds {} backups", remote.name, infos.len());
                (remote.clone(), infos)
            }
            Err(e) => {
                log::warn!("Failed to list backups of remote {}: {e:#}", remote.name);
                (remote.clone(), Vec::new())
            }
        })
        .collect();

    aggregate_backups(&listings)
}

/// Hands out listing generations and rejects stale results
///
/// Lives on the UI thread. Only the result of the latest request is applied.
#[derive(Debug, Default)]
pub struct ListingGenerations {
    latest: Cell<u64>,
}

impl ListingGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new listing request
    pub fn next(&self) -> u64 {
        let generation = self.latest.get() + 1;
        self.latest.set(generation);
        generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.latest.get()
    }

    /// Return the listing if it is the latest one, logging stale results
    pub fn accept(&self, listing: RemoteListing) -> Option<RemoteListing> {
        if self.is_current(listing.generation) {
            Some(listing)
        } else {
            log::debug!(
                "Discarding stale backup listing #{} (latest #{})",
                listing.generation,
                self.latest.get()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use xo_console_common::BackupType;

    #[derive(Default)]
    struct FakeLister {
        calls: Mutex<Vec<String>>,
        remotes: Option<Vec<Remote>>,
    }

    impl BackupLister for FakeLister {
        fn list_remotes(&self) -> anyhow::Result<Vec<Remote>> {
            match &self.remotes {
                Some(remotes) => Ok(remotes.clone()),
                None => anyhow::bail!("remote.getAll failed"),
            }
        }

        fn list_backups(&self, remote_id: &str) -> anyhow::Result<Vec<RemoteBackupInfo>> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(remote_id.to_string());
            }

            match remote_id {
                "broken" => anyhow::bail!("remote unreachable"),
                _ => Ok(vec![RemoteBackupInfo {
                    datetime: 1_000,
                    disks: Vec::new(),
                    id: format!("{remote_id}/db1.xva"),
                    name: "db1".to_string(),
                    tag: "daily".to_string(),
                    backup_type: BackupType::Xva,
                    uuid: None,
                }]),
            }
        }
    }

    fn remote(id: &str, enabled: bool) -> Remote {
        Remote {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("nfs://{id}"),
            enabled,
        }
    }

    #[test]
    fn test_failing_remote_is_skipped() {
        let lister = FakeLister::default();
        let remotes = vec![remote("r1", true), remote("broken", true), remote("r2", true)];

        let summaries = list_remote_backups(&lister, &remotes);
        let db1 = &summaries["db1"];
        assert_eq!(db1.backups.len(), 2);
        assert_eq!(db1.tags_by_remote.len(), 2);
        assert!(!db1.tags_by_remote.contains_key("broken"));
    }

    #[test]
    fn test_disabled_remotes_not_queried() {
        let lister = FakeLister::default();
        let remotes = vec![remote("r1", true), remote("off", false)];

        list_remote_backups(&lister, &remotes);
        let calls = lister.calls.lock().unwrap();
        assert_eq!(*calls, vec!["r1".to_string()]);
    }

    #[test]
    fn test_no_remotes_yields_no_backups() {
        let lister = FakeLister::default();
        assert!(list_remote_backups(&lister, &[]).is_empty());
    }

    #[test]
    fn test_stale_generation_rejected() {
        let generations = ListingGenerations::new();
        let first = generations.next();
        let second = generations.next();

        let listing = |generation| RemoteListing {
            generation,
            fetched_remotes: None,
            listed_remotes: Vec::new(),
            summaries: BTreeMap::new(),
        };

        // The slow first request answers after the second was issued
        assert!(generations.accept(listing(first)).is_none());
        assert!(generations.accept(listing(second)).is_some());
        assert!(generations.is_current(second));
    }

    #[test]
    fn test_listing_uses_fresh_remotes() {
        let lister = FakeLister {
            remotes: Some(vec![remote("r1", true), remote("added", true), remote("off", false)]),
            ..FakeLister::default()
        };

        let listing = RemoteListing::fetch(&lister, 4, &[remote("r1", true)]);
        assert_eq!(listing.generation, 4);
        assert_eq!(listing.fetched_remotes.map(|remotes| remotes.len()), Some(3));
        assert_eq!(
            listing.listed_remotes,
            vec![remote("r1", true), remote("added", true)]
        );
        assert_eq!(listing.summaries["db1"].backups.len(), 2);

        let mut calls = lister.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["added".to_string(), "r1".to_string()]);
    }

    #[test]
    fn test_listing_falls_back_to_known_remotes() {
        let lister = FakeLister::default();

        let listing = RemoteListing::fetch(&lister, 1, &[remote("r1", true)]);
        assert_eq!(listing.fetched_remotes, None);
        assert_eq!(listing.listed_remotes, vec![remote("r1", true)]);
        assert_eq!(*lister.calls.lock().unwrap(), vec!["r1".to_string()]);
    }

    #[test]
    fn test_changed_remotes_start_new_listing() {
        use std::rc::Rc;
        use xo_console_common::{ObjectStore, StoreChange};

        let store = Rc::new(ObjectStore::new());
        let generations = Rc::new(ListingGenerations::new());
        let listed = Rc::new(std::cell::RefCell::new(vec![remote("r1", true)]));
        store.set_remotes(vec![remote("r1", true)]);

        // Relist only when the enabled remotes differ from the listed ones
        let _subscription = {
            let store_ref = Rc::downgrade(&store);
            let generations = Rc::clone(&generations);
            let listed = Rc::clone(&listed);
            store.subscribe(move |change| {
                let Some(store) = store_ref.upgrade() else {
                    return;
                };
                if *change == StoreChange::Remotes
                    && needs_relisting(&listed.borrow(), &store.enabled_remotes())
                {
                    generations.next();
                }
            })
        };

        // The same list polled again
        store.set_remotes(vec![remote("r1", true)]);
        assert!(generations.is_current(0));

        // A disabled remote appears
        store.set_remotes(vec![remote("r1", true), remote("off", false)]);
        assert!(generations.is_current(0));

        // A new enabled remote appears
        store.set_remotes(vec![remote("r1", true), remote("r2", true)]);
        assert!(generations.is_current(1));
    }
}
