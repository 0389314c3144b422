//! Dashboard page: fleet overview or per-resource-set quotas

use crate::xo_client::XoClient;
use gtk::glib;
use gtk::prelude::*;
use gtk::{Label, LevelBar, Orientation, ProgressBar, ScrolledWindow};
use libadwaita as adw;
use adw::prelude::*;
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use xo_console_common::dashboard::{host_ids, hosts_with_missing_patches, overview_mode};
use xo_console_common::format::format_percent;
use xo_console_common::{
    FleetOverview, Memo, OverviewMode, ResourceKind, ResourceSet, Revisions, StoreChange,
    Subscription, format_bytes, format_size, plan,
};

use super::{ConsoleContext, dialogs};

/// Memo key: only objects and users feed the overview
fn overview_key(revisions: Revisions) -> (u64, u64) {
    (revisions.objects, revisions.users)
}

fn redraws_on(change: StoreChange) -> bool {
    !matches!(change, StoreChange::Remotes)
}

/// Missing patch counts per host id
#[derive(Default)]
struct PatchCounts {
    /// Hosts the counts were requested for
    hosts: Option<Vec<String>>,
    /// `None` while the request runs
    counts: Option<BTreeMap<String, usize>>,
}

/// Ask every host for its missing patches; hosts that fail are left out
fn count_missing_patches(client: &XoClient, hosts: &[String]) -> BTreeMap<String, usize> {
    hosts
        .par_iter()
        .filter_map(|id| match client.missing_patch_count(id) {
            Ok(count) => Some((id.clone(), count)),
            Err(e) => {
                log::warn!("Failed to list missing patches of host {id}: {e}");
                None
            }
        })
        .collect()
}

struct DashboardState {
    ctx: ConsoleContext,
    container: gtk::Box,
    overview: Memo<(u64, u64), FleetOverview>,
    patches: RefCell<PatchCounts>,
}

impl DashboardState {
    fn render(self: &Rc<Self>) {
        while let Some(child) = self.container.first_child() {
            self.container.remove(&child);
        }

        let store = &self.ctx.store;
        let mode = overview_mode(
            self.ctx.config.plan,
            store.is_admin(),
            &store.permissions(),
            &store.resource_sets(),
        );

        match mode {
            OverviewMode::Upgrade => self.container.append(&dialogs::status_page(
                "starred-symbolic",
                "Upgrade Needed",
                "The dashboard is available starting with the Enterprise plan.",
            )),
            OverviewMode::NotEnoughPermissions => self.container.append(&dialogs::status_page(
                "dialog-password-symbolic",
                "Not Enough Permissions",
                "Ask an administrator for access to at least one object.",
            )),
            OverviewMode::ResourceSets => {
                for resource_set in store.resource_sets().iter() {
                    self.container.append(&resource_set_group(resource_set));
                }
            }
            OverviewMode::Default => {
                let key = overview_key(store.revisions());
                let overview = self.overview.get_or_compute(&key, || {
                    let n_users = store.users().len();
                    store.with_objects(|objects| {
                        FleetOverview::compute(
                            objects.values(),
                            n_users,
                            self.ctx.config.top_sr_count,
                        )
                    })
                });
                self.render_overview(&overview);
                self.check_patches();
                self.render_patches();
            }
        }
    }

    /// Refetch missing patch counts when the set of hosts changed
    fn check_patches(self: &Rc<Self>) {
        let hosts = self
            .ctx
            .store
            .with_objects(|objects| host_ids(objects.values()));
        if self.patches.borrow().hosts.as_ref() == Some(&hosts) {
            return;
        }
        let Some(client) = self.ctx.client() else {
            return;
        };

        log::debug!("Checking missing patches of {} hosts", hosts.len());
        *self.patches.borrow_mut() = PatchCounts {
            hosts: Some(hosts.clone()),
            counts: None,
        };

        let (sender, receiver) = async_channel::bounded(1);
        let requested = hosts.clone();
        std::thread::spawn(move || {
            let _ = sender.send_blocking(count_missing_patches(&client, &requested));
        });

        let weak = Rc::downgrade(self);
        glib::spawn_future_local(async move {
            let Ok(counts) = receiver.recv().await else {
                return;
            };
            let Some(state) = weak.upgrade() else {
                return;
            };
            {
                let mut patches = state.patches.borrow_mut();
                // Superseded by a request for another host set
                if patches.hosts.as_ref() != Some(&hosts) {
                    return;
                }
                patches.counts = Some(counts);
            }
            state.render();
        });
    }

    fn render_patches(&self) {
        let group = adw::PreferencesGroup::builder()
            .title("Missing Patches")
            .build();

        match &self.patches.borrow().counts {
            None => group.add(&adw::ActionRow::builder().title("Checking…").build()),
            Some(counts) => {
                let hosts = self
                    .ctx
                    .store
                    .with_objects(|objects| hosts_with_missing_patches(objects.values(), counts));
                if hosts.is_empty() {
                    group.add(
                        &adw::ActionRow::builder()
                            .title("All hosts are up to date")
                            .build(),
                    );
                }
                for host in hosts {
                    let name = if host.host_name.is_empty() {
                        &host.host_id
                    } else {
                        &host.host_name
                    };
                    let row = count_row(name, host.missing);
                    row.set_subtitle(&host.pool_name);
                    group.add(&row);
                }
            }
        }
        self.container.append(&group);
    }

    fn render_overview(&self, overview: &FleetOverview) {
        // Counters
        let counts = adw::PreferencesGroup::builder().title("Fleet").build();
        for (title, value) in [
            ("Pools", overview.n_pools),
            ("Hosts", overview.n_hosts),
            ("VMs", overview.n_vms),
            ("Users", overview.n_users),
            ("Alarms", overview.n_alarm_messages),
            ("Pending tasks", overview.n_pending_tasks),
        ] {
            counts.add(&count_row(title, value));
        }
        self.container.append(&counts);

        // Hosts
        let hosts = adw::PreferencesGroup::builder().title("Hosts").build();
        let metrics = &overview.host_metrics;
        hosts.add(&count_row("CPUs", metrics.cpus as usize));
        hosts.add(&level_row(
            "Memory",
            &format!(
                "Used: {} (Total: {})",
                format_bytes(metrics.memory_usage),
                format_bytes(metrics.memory_total)
            ),
            metrics.memory_ratio(),
        ));
        self.container.append(&hosts);

        // Storage
        let storage = adw::PreferencesGroup::builder().title("Storage").build();
        let sr_metrics = &overview.sr_metrics;
        storage.add(&level_row(
            "Writable SRs",
            &format!(
                "Used: {} (Total: {})",
                format_size(sr_metrics.sr_usage),
                format_size(sr_metrics.sr_total)
            ),
            sr_metrics.usage_ratio(),
        ));
        self.container.append(&storage);

        // VMs
        let vms = adw::PreferencesGroup::builder()
            .title("VM States")
            .description(format!("{} vCPUs on running VMs", overview.vm_metrics.vcpus))
            .build();
        for (title, value) in [
            ("Running", overview.vm_metrics.running),
            ("Halted", overview.vm_metrics.halted),
            ("Other", overview.vm_metrics.other),
        ] {
            vms.add(&count_row(title, value));
        }
        self.container.append(&vms);

        // Top SRs by usage
        if !overview.top_writable_srs.is_empty() {
            let top = adw::PreferencesGroup::builder()
                .title("Most Used SRs")
                .build();
            for usage in &overview.top_writable_srs {
                let row = adw::ActionRow::builder()
                    .title(usage.name_label.as_str())
                    .build();
                let bar = ProgressBar::builder()
                    .fraction(usage.ratio)
                    .text(format_percent(usage.ratio))
                    .show_text(true)
                    .valign(gtk::Align::Center)
                    .width_request(200)
                    .build();
                row.add_suffix(&bar);
                top.add(&row);
            }
            self.container.append(&top);
        }
    }
}

fn count_row(title: &str, value: usize) -> adw::ActionRow {
    let row = adw::ActionRow::builder().title(title).build();
    let label = Label::new(Some(&value.to_string()));
    label.add_css_class("title-4");
    row.add_suffix(&label);
    row
}

fn level_row(title: &str, subtitle: &str, ratio: f64) -> adw::ActionRow {
    let row = adw::ActionRow::builder()
        .title(title)
        .subtitle(subtitle)
        .build();
    let bar = LevelBar::builder()
        .min_value(0.0)
        .max_value(1.0)
        .value(ratio)
        .valign(gtk::Align::Center)
        .width_request(200)
        .build();
    row.add_suffix(&bar);
    row
}

fn resource_set_group(resource_set: &ResourceSet) -> adw::PreferencesGroup {
    let group = adw::PreferencesGroup::builder()
        .title(resource_set.name.as_str())
        .build();

    let quotas = resource_set.quotas();
    for kind in ResourceKind::ALL {
        let quota = quotas.get(kind);
        group.add(&level_row(
            kind.title(),
            &quota.describe(kind),
            quota.usage_ratio(),
        ));
    }
    group
}

pub struct DashboardPage {
    pub widget: ScrolledWindow,
    _subscription: Subscription,
}

impl DashboardPage {
    pub fn new(ctx: &ConsoleContext) -> Self {
        let container = gtk::Box::new(Orientation::Vertical, 24);

        let clamp = adw::Clamp::new();
        clamp.set_maximum_size(800);
        clamp.set_tightening_threshold(600);
        clamp.set_child(Some(&container));
        clamp.set_margin_top(24);
        clamp.set_margin_bottom(24);
        clamp.set_margin_start(12);
        clamp.set_margin_end(12);

        let widget = ScrolledWindow::new();
        widget.set_vexpand(true);
        widget.set_child(Some(&clamp));

        let state = Rc::new(DashboardState {
            ctx: ctx.clone(),
            container,
            overview: Memo::new(),
            patches: RefCell::new(PatchCounts::default()),
        });

        if plan::can_view_dashboard(ctx.config.plan) {
            // Nothing is known until the first sign-in
            state.container.append(&dialogs::loading_page("Connecting"));
        } else {
            state.render();
        }

        let subscription = ctx.store.subscribe(move |change| {
            if redraws_on(*change) {
                state.render();
            }
        });

        Self {
            widget,
            _subscription: subscription,
        }
    }
}
