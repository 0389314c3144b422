//! Client-side copy of the server collections
//!
//! The store lives on the UI thread. Every collection carries a revision
//! that increases on each change, which views use as memo keys, and each
//! change is announced to subscribers.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashMap};

use crate::backup::Remote;
use crate::objects::{User, XoObject};
use crate::quota::ResourceSet;
use crate::sr::StorageRepository;
use crate::subscription::{Subscription, Topic};

/// Collection that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreChange {
    Objects,
    Users,
    Permissions,
    ResourceSets,
    Remotes,
    CurrentUser,
}

/// Revision of every collection, usable as a memo key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Revisions {
    pub objects: u64,
    pub users: u64,
    pub permissions: u64,
    pub resource_sets: u64,
    pub remotes: u64,
    pub current_user: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: HashMap<String, XoObject>,
    users: Vec<User>,
    permissions: BTreeMap<String, serde_json::Value>,
    resource_sets: Vec<ResourceSet>,
    remotes: Vec<Remote>,
    current_user: Option<User>,
    revisions: Revisions,
}

impl StoreState {
    fn bump(&mut self, change: StoreChange) {
        let revision = match change {
            StoreChange::Objects => &mut self.revisions.objects,
            StoreChange::Users => &mut self.revisions.users,
            StoreChange::Permissions => &mut self.revisions.permissions,
            StoreChange::ResourceSets => &mut self.revisions.resource_sets,
            StoreChange::Remotes => &mut self.revisions.remotes,
            StoreChange::CurrentUser => &mut self.revisions.current_user,
        };
        *revision += 1;
    }
}

#[derive(Default)]
pub struct ObjectStore {
    state: RefCell<StoreState>,
    changes: Topic<StoreChange>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to collection changes
    pub fn subscribe(&self, callback: impl Fn(&StoreChange) + 'static) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn update(&self, change: StoreChange, apply: impl FnOnce(&mut StoreState)) {
        {
            let mut state = self.state.borrow_mut();
            apply(&mut state);
            state.bump(change);
        }
        // Borrow released so subscribers can read the store
        self.changes.publish(&change);
    }

    pub fn revisions(&self) -> Revisions {
        self.state.borrow().revisions
    }

    /// Add or replace objects announced by an `enter` notification
    pub fn apply_enter(&self, items: Vec<XoObject>) {
        let items: Vec<(String, XoObject)> = items
            .into_iter()
            .filter_map(|object| Some((object.id()?.to_string(), object)))
            .collect();
        if items.is_empty() {
            return;
        }

        log::debug!("{} objects entered", items.len());
        self.update(StoreChange::Objects, |state| state.objects.extend(items));
    }

    /// Remove objects announced by an `exit` notification
    pub fn apply_exit<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids.into_iter().collect();
        let known = {
            let state = self.state.borrow();
            ids.iter().any(|id| state.objects.contains_key(id.as_ref()))
        };
        if !known {
            return;
        }

        log::debug!("{} objects exited", ids.len());
        self.update(StoreChange::Objects, |state| {
            for id in &ids {
                state.objects.remove(id.as_ref());
            }
        });
    }

    /// Replace the whole object collection (initial fetch)
    pub fn replace_objects(&self, items: Vec<XoObject>) {
        let objects: HashMap<String, XoObject> = items
            .into_iter()
            .filter_map(|object| Some((object.id()?.to_string(), object)))
            .collect();

        log::info!("Loaded {} objects", objects.len());
        self.update(StoreChange::Objects, |state| state.objects = objects);
    }

    /// Store `value` in a collection, announcing it only when it differs
    fn replace<T: PartialEq>(
        &self,
        change: StoreChange,
        field: impl Fn(&mut StoreState) -> &mut T,
        value: T,
    ) -> bool {
        let unchanged = {
            let mut state = self.state.borrow_mut();
            *field(&mut state) == value
        };
        if unchanged {
            return false;
        }
        self.update(change, |state| *field(state) = value);
        true
    }

    pub fn set_users(&self, users: Vec<User>) -> bool {
        self.replace(StoreChange::Users, |state| &mut state.users, users)
    }

    pub fn set_permissions(&self, permissions: BTreeMap<String, serde_json::Value>) -> bool {
        self.replace(
            StoreChange::Permissions,
            |state| &mut state.permissions,
            permissions,
        )
    }

    pub fn set_resource_sets(&self, resource_sets: Vec<ResourceSet>) -> bool {
        self.replace(
            StoreChange::ResourceSets,
            |state| &mut state.resource_sets,
            resource_sets,
        )
    }

    pub fn set_remotes(&self, remotes: Vec<Remote>) -> bool {
        self.replace(StoreChange::Remotes, |state| &mut state.remotes, remotes)
    }

    pub fn set_current_user(&self, user: Option<User>) -> bool {
        self.replace(StoreChange::CurrentUser, |state| &mut state.current_user, user)
    }

    /// Borrow the object collection for the duration of `f`
    pub fn with_objects<R>(&self, f: impl FnOnce(&HashMap<String, XoObject>) -> R) -> R {
        let state = self.state.borrow();
        f(&state.objects)
    }

    pub fn object_count(&self) -> usize {
        self.state.borrow().objects.len()
    }

    /// All storage repositories
    pub fn srs(&self) -> Vec<StorageRepository> {
        self.with_objects(|objects| {
            objects
                .values()
                .filter_map(|object| match object {
                    XoObject::Sr(sr) => Some(sr.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn users(&self) -> Ref<'_, [User]> {
        Ref::map(self.state.borrow(), |state| state.users.as_slice())
    }

    pub fn permissions(&self) -> Ref<'_, BTreeMap<String, serde_json::Value>> {
        Ref::map(self.state.borrow(), |state| &state.permissions)
    }

    pub fn resource_sets(&self) -> Ref<'_, [ResourceSet]> {
        Ref::map(self.state.borrow(), |state| state.resource_sets.as_slice())
    }

    /// Remotes whose backups are listed
    pub fn enabled_remotes(&self) -> Vec<Remote> {
        self.state
            .borrow()
            .remotes
            .iter()
            .filter(|remote| remote.enabled)
            .cloned()
            .collect()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .borrow()
            .current_user
            .as_ref()
            .is_some_and(User::is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Pool;
    use crate::sr::tests::sr;
    use std::rc::Rc;

    fn pool(id: &str) -> XoObject {
        XoObject::Pool(Pool {
            id: id.to_string(),
            name_label: id.to_string(),
        })
    }

    #[test]
    fn test_enter_exit_bump_revision() {
        let store = ObjectStore::new();
        assert_eq!(store.revisions().objects, 0);

        store.apply_enter(vec![pool("p1"), XoObject::Sr(sr("s1", "p1", "h1", false))]);
        assert_eq!(store.object_count(), 2);
        assert_eq!(store.revisions().objects, 1);
        assert_eq!(store.srs().len(), 1);

        // Unknown ids leave the collection untouched
        store.apply_exit(["missing"]);
        assert_eq!(store.revisions().objects, 1);

        store.apply_exit(["p1"]);
        assert_eq!(store.object_count(), 1);
        assert_eq!(store.revisions().objects, 2);
    }

    #[test]
    fn test_untracked_objects_ignored() {
        let store = ObjectStore::new();
        store.apply_enter(vec![XoObject::Other]);
        assert_eq!(store.object_count(), 0);
        assert_eq!(store.revisions(), Revisions::default());
    }

    #[test]
    fn test_subscribers_can_read_store() {
        let store = Rc::new(ObjectStore::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let weak = Rc::downgrade(&store);
        let seen_inner = Rc::clone(&seen);
        let _subscription = store.subscribe(move |change| {
            if let Some(store) = weak.upgrade() {
                seen_inner
                    .borrow_mut()
                    .push((*change, store.object_count()));
            }
        });

        store.replace_objects(vec![pool("p1"), pool("p2")]);
        store.set_users(vec![User {
            id: "u1".into(),
            email: "admin@example.org".into(),
            permission: "admin".into(),
        }]);

        assert_eq!(
            *seen.borrow(),
            vec![(StoreChange::Objects, 2), (StoreChange::Users, 2)]
        );
    }

    #[test]
    fn test_admin_and_enabled_remotes() {
        let store = ObjectStore::new();
        assert!(!store.is_admin());

        store.set_current_user(Some(User {
            id: "u1".into(),
            email: "admin@example.org".into(),
            permission: "admin".into(),
        }));
        assert!(store.is_admin());

        let remote = |id: &str, enabled: bool| Remote {
            id: id.into(),
            name: id.into(),
            url: format!("file:///{id}"),
            enabled,
        };
        store.set_remotes(vec![remote("r1", true), remote("r2", false)]);
        let enabled = store.enabled_remotes();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "r1");
    }

    #[test]
    fn test_unchanged_collections_are_not_announced() {
        let store = ObjectStore::new();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&changes);
        let _subscription = store.subscribe(move |change| seen.borrow_mut().push(*change));

        let remotes = vec![Remote {
            id: "r1".into(),
            name: "nfs".into(),
            url: "nfs://backup/xo".into(),
            enabled: true,
        }];
        assert!(store.set_remotes(remotes.clone()));
        assert!(!store.set_remotes(remotes.clone()));
        assert!(!store.set_permissions(BTreeMap::new()));
        assert!(!store.set_current_user(None));
        assert_eq!(store.revisions().remotes, 1);

        let mut renamed = remotes;
        renamed[0].name = "nfs-2".into();
        assert!(store.set_remotes(renamed));
        assert_eq!(store.revisions().remotes, 2);
        assert_eq!(
            *changes.borrow(),
            vec![StoreChange::Remotes, StoreChange::Remotes]
        );
    }
}
