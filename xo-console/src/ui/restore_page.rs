//! Restore page: the backup table of every VM found on the remotes

use crate::remote_lister::{ListingGenerations, RemoteListing, needs_relisting};
use gtk::glib;
use gtk::prelude::*;
use gtk::{ListBox, Orientation, ScrolledWindow};
use libadwaita as adw;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use xo_console_common::{
    BackupColumn, Remote, SortOrder, StoreChange, Subscription, VmBackupSummary, plan,
};

use super::toolbar::{self, RestoreToolbar};
use super::{ConsoleContext, backup_list, dialogs, restore_dialog};

const PAGE_UPGRADE: &str = "upgrade";
const PAGE_NOT_CONNECTED: &str = "not-connected";
const PAGE_LOADING: &str = "loading";
const PAGE_NO_REMOTES: &str = "no-remotes";
const PAGE_LIST: &str = "list";

/// Page to show while a listing starts, `None` to keep the current one
fn pending_page(connected: bool, has_summaries: bool) -> Option<&'static str> {
    match (connected, has_summaries) {
        (false, _) => Some(PAGE_NOT_CONNECTED),
        (true, false) => Some(PAGE_LOADING),
        (true, true) => None,
    }
}

/// Page to show once a listing run has finished
fn listing_page(listed_remotes: &[Remote]) -> &'static str {
    if listed_remotes.is_empty() {
        PAGE_NO_REMOTES
    } else {
        PAGE_LIST
    }
}

struct PageState {
    ctx: ConsoleContext,
    stack: gtk::Stack,
    list: ListBox,
    toolbar: RestoreToolbar,
    summaries: RefCell<BTreeMap<String, VmBackupSummary>>,
    column: Cell<BackupColumn>,
    order: Cell<SortOrder>,
    generations: ListingGenerations,
    /// Enabled remotes behind the shown summaries
    listed_remotes: RefCell<Vec<Remote>>,
    refresh_scheduled: Cell<bool>,
}

impl PageState {
    fn render(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let query = self.toolbar.search_entry.text();
        backup_list::refresh_backup_list(
            &self.list,
            &self.summaries.borrow(),
            self.column.get(),
            self.order.get(),
            query.as_str(),
            &self.toolbar.match_label,
            move |vm_name| {
                if let Some(state) = weak.upgrade() {
                    state.open_restore_dialog(&vm_name);
                }
            },
        );
    }

    fn open_restore_dialog(&self, vm_name: &str) {
        let summary = self.summaries.borrow().get(vm_name).cloned();
        match summary {
            Some(summary) => restore_dialog::show_restore_dialog(&self.ctx, &summary),
            None => log::warn!("No backups known for {vm_name}"),
        }
    }

    fn save_sort(&self) {
        if let Err(e) = self
            .ctx
            .preferences
            .set_sort(self.column.get(), self.order.get())
        {
            log::warn!("Failed to save sort preference: {e:#}");
        }
    }

    /// Refresh once the current main loop iteration is done
    ///
    /// Changes announced together (a reconnect, a poll) share one listing.
    fn schedule_refresh(self: &Rc<Self>) {
        if self.refresh_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(self);
        glib::idle_add_local_once(move || {
            if let Some(state) = weak.upgrade() {
                state.refresh_scheduled.set(false);
                state.refresh();
            }
        });
    }

    /// Refresh the remotes and list their backups on a worker thread
    fn refresh(self: &Rc<Self>) {
        let generation = self.generations.next();

        let client = self.ctx.client();
        let has_summaries = !self.summaries.borrow().is_empty();
        if let Some(page) = pending_page(client.is_some(), has_summaries) {
            self.stack.set_visible_child_name(page);
        }

        let Some(client) = client else {
            log::debug!("Not connected, backup listing #{generation} skipped");
            self.summaries.borrow_mut().clear();
            self.listed_remotes.borrow_mut().clear();
            self.toolbar.refresh_btn.set_sensitive(true);
            return;
        };
        // Re-enabled by the current listing only
        self.toolbar.refresh_btn.set_sensitive(false);
        log::info!("Listing backups (#{generation})");

        let known = self.ctx.store.enabled_remotes();
        let (sender, receiver) = async_channel::bounded(1);
        std::thread::spawn(move || {
            let listing = RemoteListing::fetch(client.as_ref(), generation, &known);
            let _ = sender.send_blocking(listing);
        });

        let weak = Rc::downgrade(self);
        glib::spawn_future_local(async move {
            let Ok(listing) = receiver.recv().await else {
                return;
            };
            let Some(state) = weak.upgrade() else {
                return;
            };
            let Some(listing) = state.generations.accept(listing) else {
                return;
            };

            log::info!(
                "Found backups of {} VMs on {} remotes",
                listing.summaries.len(),
                listing.listed_remotes.len()
            );
            state
                .stack
                .set_visible_child_name(listing_page(&listing.listed_remotes));
            *state.summaries.borrow_mut() = listing.summaries;
            *state.listed_remotes.borrow_mut() = listing.listed_remotes;
            state.toolbar.refresh_btn.set_sensitive(true);
            state.render();

            // Matches what was just listed, so no relisting follows
            if let Some(remotes) = listing.fetched_remotes {
                state.ctx.store.set_remotes(remotes);
            }
        });
    }
}

pub struct RestorePage {
    pub widget: gtk::Stack,
    _subscriptions: Vec<Subscription>,
}

impl RestorePage {
    pub fn new(ctx: &ConsoleContext) -> Self {
        let stack = gtk::Stack::new();
        stack.set_transition_type(gtk::StackTransitionType::Crossfade);

        stack.add_named(
            &dialogs::status_page(
                "starred-symbolic",
                "Upgrade Needed",
                "Restoring backups is not available with your current plan.",
            ),
            Some(PAGE_UPGRADE),
        );

        if !plan::can_restore(ctx.config.plan) {
            stack.set_visible_child_name(PAGE_UPGRADE);
            return Self {
                widget: stack,
                _subscriptions: Vec::new(),
            };
        }

        stack.add_named(
            &dialogs::status_page(
                "network-offline-symbolic",
                "Not Connected",
                "Backups are listed once the console is connected to Xen Orchestra.",
            ),
            Some(PAGE_NOT_CONNECTED),
        );
        stack.add_named(&dialogs::loading_page("Loading…"), Some(PAGE_LOADING));
        stack.add_named(
            &dialogs::status_page(
                "network-server-symbolic",
                "No Remotes",
                "Enable a backup remote in Xen Orchestra to restore VMs from it.",
            ),
            Some(PAGE_NO_REMOTES),
        );

        let prefs = ctx.preferences.load().unwrap_or_else(|e| {
            log::warn!("Failed to load preferences: {e:#}");
            Default::default()
        });
        let toolbar = toolbar::create_restore_toolbar(prefs.sort_column, prefs.sort_order);

        let list = ListBox::new();
        list.set_selection_mode(gtk::SelectionMode::None);
        list.add_css_class("boxed-list");

        let scrolled = ScrolledWindow::new();
        scrolled.set_vexpand(true);
        scrolled.set_child(Some(&list));

        let clamp = adw::Clamp::new();
        clamp.set_maximum_size(900);
        clamp.set_tightening_threshold(600);
        clamp.set_child(Some(&scrolled));
        clamp.set_margin_top(12);
        clamp.set_margin_bottom(24);
        clamp.set_margin_start(12);
        clamp.set_margin_end(12);

        let content = gtk::Box::new(Orientation::Vertical, 0);
        content.append(&toolbar.container);
        content.append(&toolbar.match_label);
        content.append(&clamp);
        stack.add_named(&content, Some(PAGE_LIST));
        stack.set_visible_child_name(PAGE_LOADING);

        let state = Rc::new(PageState {
            ctx: ctx.clone(),
            stack: stack.clone(),
            list,
            toolbar,
            summaries: RefCell::new(BTreeMap::new()),
            column: Cell::new(prefs.sort_column),
            order: Cell::new(prefs.sort_order),
            generations: ListingGenerations::new(),
            listed_remotes: RefCell::new(Vec::new()),
            refresh_scheduled: Cell::new(false),
        });

        let weak = Rc::downgrade(&state);
        state.toolbar.search_entry.connect_search_changed(move |_| {
            if let Some(state) = weak.upgrade() {
                state.render();
            }
        });

        let weak = Rc::downgrade(&state);
        state.toolbar.sort_column.connect_selected_notify(move |dropdown| {
            if let Some(state) = weak.upgrade() {
                state.column.set(toolbar::column_from_index(dropdown.selected()));
                state.save_sort();
                state.render();
            }
        });

        let weak = Rc::downgrade(&state);
        state.toolbar.sort_order.connect_toggled(move |button| {
            if let Some(state) = weak.upgrade() {
                let order = if button.is_active() {
                    SortOrder::Ascending
                } else {
                    SortOrder::Descending
                };
                button.set_icon_name(toolbar::order_icon(order));
                state.order.set(order);
                state.save_sort();
                state.render();
            }
        });

        let weak = Rc::downgrade(&state);
        state.toolbar.refresh_btn.connect_clicked(move |_| {
            if let Some(state) = weak.upgrade() {
                state.refresh();
            }
        });

        // The page lives as long as these subscriptions
        let remotes_state = Rc::clone(&state);
        let remotes = ctx.store.subscribe(move |change| {
            if *change != StoreChange::Remotes {
                return;
            }
            let enabled = remotes_state.ctx.store.enabled_remotes();
            if needs_relisting(&remotes_state.listed_remotes.borrow(), &enabled) {
                remotes_state.schedule_refresh();
            }
        });
        let connection = ctx
            .connection_changes
            .subscribe(move |_| state.schedule_refresh());

        Self {
            widget: stack,
            _subscriptions: vec![remotes, connection],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_page_without_client() {
        assert_eq!(pending_page(false, false), Some(PAGE_NOT_CONNECTED));
        assert_eq!(pending_page(false, true), Some(PAGE_NOT_CONNECTED));
        assert_eq!(pending_page(true, false), Some(PAGE_LOADING));
        // A shown listing stays visible while it is refreshed
        assert_eq!(pending_page(true, true), None);
    }

    #[test]
    fn test_listing_page() {
        let remote = Remote {
            id: "r1".to_string(),
            name: "nfs".to_string(),
            url: "nfs://backup/xo".to_string(),
            enabled: true,
        };
        assert_eq!(listing_page(&[]), PAGE_NO_REMOTES);
        assert_eq!(listing_page(&[remote]), PAGE_LIST);
    }
}
