//! Restore dialog: choose a backup, the target SRs and auto-start
//!
//! The dialog state is a [`RestoreForm`] updated through its reducer. On
//! confirmation the form is validated and imported on a worker thread.

use gtk::glib;
use gtk::prelude::*;
use gtk::{DropDown, ListBox, Orientation, StringList, Switch};
use libadwaita as adw;
use adw::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use xo_console_common::format::format_size;
use xo_console_common::{
    Backup, ImportRequest, RestoreAction, RestoreError, RestoreForm, RestoreOutcome,
    StorageRepository, VmBackupSummary, format_bytes, submit,
};

use super::error_helpers::{self, ErrorContext};
use super::{ConsoleContext, dialogs, notifications};

const NO_SELECTION: u32 = 0;

/// Dropdown label of an SR, e.g. `Local storage (120.00 GiB free)`
pub fn sr_label(sr: &StorageRepository) -> String {
    format!(
        "{} ({} free)",
        sr.name_label,
        format_size((sr.size - sr.physical_usage).max(0))
    )
}

fn string_list(placeholder: &str, labels: impl IntoIterator<Item = String>) -> StringList {
    let list = StringList::new(&[placeholder]);
    for label in labels {
        list.append(&label);
    }
    list
}

/// Item at `selected` in a list whose first entry is a placeholder
fn pick<T: Clone>(items: &[T], selected: u32) -> Option<T> {
    if selected == NO_SELECTION || selected == gtk::INVALID_LIST_POSITION {
        return None;
    }
    items.get(selected as usize - 1).cloned()
}

struct DialogState {
    form: RefCell<RestoreForm>,
    srs: Vec<StorageRepository>,
    disk_list: ListBox,
}

impl DialogState {
    fn dispatch(self: &Rc<Self>, action: RestoreAction) {
        self.form.borrow_mut().reduce(action);
        // Rebuild after the emitting widget's handler returns
        let state = Rc::clone(self);
        glib::idle_add_local_once(move || state.rebuild_disk_rows());
    }

    fn rebuild_disk_rows(self: &Rc<Self>) {
        while let Some(child) = self.disk_list.first_child() {
            self.disk_list.remove(&child);
        }

        let form = self.form.borrow();
        let disks = form.disks().to_vec();
        self.disk_list.set_visible(!disks.is_empty());
        if disks.is_empty() {
            return;
        }

        let candidates: Vec<StorageRepository> = form
            .secondary_sr_candidates(&self.srs)
            .into_iter()
            .cloned()
            .collect();
        let has_main_sr = form.main_sr.is_some();

        for disk in disks {
            let row = adw::ActionRow::builder()
                .title(disk.display_name())
                .subtitle(
                    disk.virtual_size
                        .map(format_bytes)
                        .unwrap_or_else(|| "Unknown size".to_string()),
                )
                .build();

            let dropdown = DropDown::new(
                Some(string_list(
                    "Same as primary SR",
                    candidates.iter().map(sr_label),
                )),
                gtk::Expression::NONE,
            );
            dropdown.set_valign(gtk::Align::Center);
            dropdown.set_sensitive(has_main_sr);

            let current = form
                .map_vdis_srs
                .get(&disk.uuid)
                .and_then(|sr| sr.as_ref())
                .and_then(|sr| candidates.iter().position(|c| c.id == sr.id));
            if let Some(index) = current {
                dropdown.set_selected(index as u32 + 1);
            }

            let state = Rc::downgrade(self);
            let options = candidates.clone();
            let vdi = disk.uuid.clone();
            dropdown.connect_selected_notify(move |dropdown| {
                let action = match pick(&options, dropdown.selected()) {
                    Some(sr) => RestoreAction::SetVdiSr {
                        vdi: vdi.clone(),
                        sr: Some(sr),
                    },
                    None => RestoreAction::ClearVdiSr(vdi.clone()),
                };
                if let Some(state) = state.upgrade() {
                    state.dispatch(action);
                }
            });

            row.add_suffix(&dropdown);
            self.disk_list.append(&row);
        }
    }
}

/// Show the restore dialog for one VM
pub fn show_restore_dialog(ctx: &ConsoleContext, summary: &VmBackupSummary) {
    let auto_start = ctx
        .preferences
        .load()
        .map(|prefs| prefs.auto_start)
        .unwrap_or_default();

    let mut srs = ctx.store.srs();
    srs.sort_by(|a, b| a.name_label.cmp(&b.name_label));

    let backups: Vec<Backup> = summary.backups_newest_first().into_iter().cloned().collect();
    let main_candidates: Vec<StorageRepository> = RestoreForm::default()
        .main_sr_candidates(&srs)
        .into_iter()
        .cloned()
        .collect();

    let disk_list = ListBox::new();
    disk_list.set_selection_mode(gtk::SelectionMode::None);
    disk_list.add_css_class("boxed-list");
    disk_list.set_visible(false);

    let state = Rc::new(DialogState {
        form: RefCell::new(RestoreForm::new(auto_start)),
        srs,
        disk_list: disk_list.clone(),
    });

    let content = gtk::Box::new(Orientation::Vertical, 12);

    let settings_list = ListBox::new();
    settings_list.set_selection_mode(gtk::SelectionMode::None);
    settings_list.add_css_class("boxed-list");

    // Backup selector
    let backup_row = adw::ActionRow::builder().title("Backup").build();
    let backup_dropdown = DropDown::new(
        Some(string_list(
            "Select a backup",
            backups.iter().map(Backup::option_label),
        )),
        gtk::Expression::NONE,
    );
    backup_dropdown.set_valign(gtk::Align::Center);
    {
        let state = Rc::clone(&state);
        let backups = backups.clone();
        backup_dropdown.connect_selected_notify(move |dropdown| {
            state.dispatch(RestoreAction::SelectBackup(pick(&backups, dropdown.selected())));
        });
    }
    backup_row.add_suffix(&backup_dropdown);
    settings_list.append(&backup_row);

    // Primary SR selector
    let sr_row = adw::ActionRow::builder()
        .title("Storage repository")
        .subtitle("Disks without an override go here")
        .build();
    let sr_dropdown = DropDown::new(
        Some(string_list("Select a SR", main_candidates.iter().map(sr_label))),
        gtk::Expression::NONE,
    );
    sr_dropdown.set_valign(gtk::Align::Center);
    {
        let state = Rc::clone(&state);
        sr_dropdown.connect_selected_notify(move |dropdown| {
            state.dispatch(RestoreAction::SelectMainSr(pick(
                &main_candidates,
                dropdown.selected(),
            )));
        });
    }
    sr_row.add_suffix(&sr_dropdown);
    settings_list.append(&sr_row);

    // Auto-start
    let start_row = adw::ActionRow::builder()
        .title("Start VM after restore")
        .build();
    let start_switch = Switch::builder()
        .active(auto_start)
        .valign(gtk::Align::Center)
        .build();
    {
        let state = Rc::clone(&state);
        start_switch.connect_active_notify(move |switch| {
            state.dispatch(RestoreAction::SetStart(switch.is_active()));
        });
    }
    start_row.add_suffix(&start_switch);
    start_row.set_activatable_widget(Some(&start_switch));
    settings_list.append(&start_row);

    content.append(&settings_list);

    let disks_label = gtk::Label::new(Some("Disk placement"));
    disks_label.set_halign(gtk::Align::Start);
    disks_label.add_css_class("heading");
    disk_list
        .bind_property("visible", &disks_label, "visible")
        .sync_create()
        .build();
    content.append(&disks_label);
    content.append(&disk_list);

    let dialog = adw::MessageDialog::new(
        Some(&ctx.window),
        Some(&format!("Restore {}", summary.vm_name())),
        Some("Choose a backup and where to restore it."),
    );
    dialog.set_extra_child(Some(&content));
    dialog.add_response("cancel", "Cancel");
    dialog.add_response("restore", "Restore");
    dialog.set_response_appearance("restore", adw::ResponseAppearance::Suggested);
    dialog.set_default_response(Some("cancel"));
    dialog.set_close_response("cancel");

    let ctx = ctx.clone();
    dialog.connect_response(None, move |_, response| {
        if response == "restore" {
            let form = state.form.borrow().clone();
            submit_restore(&ctx, form);
        }
    });

    dialog.present();
}

/// Progress reported by the restore worker
enum RestoreProgress {
    Started(ImportRequest),
    Finished(Result<RestoreOutcome, RestoreError>),
}

fn submit_restore(ctx: &ConsoleContext, form: RestoreForm) {
    let Some(client) = ctx.client() else {
        dialogs::show_error(&ctx.window, "Not Connected", "Connect to the XO server first.");
        return;
    };

    let (sender, receiver) = async_channel::bounded(2);
    std::thread::spawn(move || {
        let started = sender.clone();
        let result = submit(&form, client.as_ref(), |request| {
            let _ = started.send_blocking(RestoreProgress::Started(request.clone()));
        });
        let _ = sender.send_blocking(RestoreProgress::Finished(result));
    });

    let ctx = ctx.clone();
    glib::spawn_future_local(async move {
        let mut vm_name = None;
        while let Ok(progress) = receiver.recv().await {
            match progress {
                RestoreProgress::Started(request) => {
                    if let Err(e) = ctx.preferences.set_auto_start(request.start) {
                        log::warn!("Failed to save auto-start preference: {e:#}");
                    }
                    notifications::notify_restore_started(&ctx.app, &request.vm_name);
                    log::info!(
                        "Restoring {} ({:?}) from remote {} to SR {}",
                        request.vm_name,
                        request.backup_type,
                        request.remote,
                        request.sr
                    );
                    vm_name = Some(request.vm_name);
                }
                RestoreProgress::Finished(Ok(outcome)) => {
                    let vm_name = vm_name.take().unwrap_or_default();
                    notifications::notify_restore_completed(&ctx.app, &vm_name, &outcome);
                    dialogs::show_toast(&ctx.window, &format!("{vm_name} restored"));
                }
                RestoreProgress::Finished(Err(e @ RestoreError::MissingSelection)) => {
                    log::warn!("Restore not submitted: {e}");
                    notifications::notify_restore_failed(&ctx.app, &e);
                    dialogs::show_toast(&ctx.window, &e.to_string());
                }
                RestoreProgress::Finished(Err(e)) => {
                    log::error!("Restore failed: {e}");
                    notifications::notify_restore_failed(&ctx.app, &e);
                    error_helpers::show_error_with_context(
                        &ctx.window,
                        ErrorContext::Restore,
                        &e.to_string(),
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_skips_placeholder() {
        let items = vec!["a", "b"];
        assert_eq!(pick(&items, 0), None);
        assert_eq!(pick(&items, 1), Some("a"));
        assert_eq!(pick(&items, 2), Some("b"));
        assert_eq!(pick(&items, 3), None);
        assert_eq!(pick(&items, gtk::INVALID_LIST_POSITION), None);
    }

    #[test]
    fn test_sr_label() {
        let sr = StorageRepository {
            id: "sr1".to_string(),
            name_label: "Local storage".to_string(),
            pool: "p1".to_string(),
            container: "h1".to_string(),
            shared: false,
            content_type: "user".to_string(),
            size: 4096,
            physical_usage: 1024,
        };
        assert_eq!(sr_label(&sr), "Local storage (3.00 KiB free)");
    }
}
