//! Backup table display and filtering

use gtk::prelude::*;
use gtk::{Label, ListBox};
use std::collections::BTreeMap;
use xo_console_common::backup::filter_summaries;
use xo_console_common::{BackupColumn, SortOrder, VmBackupSummary, sorted_summaries};

use super::backup_row::BackupRow;
use super::dialogs;

/// "Showing X of Y VMs" or "Y VMs"
pub fn match_text(shown: usize, total: usize, filtered: bool) -> String {
    let noun = if total == 1 { "VM" } else { "VMs" };
    if filtered {
        format!("Showing {shown} of {total} {noun}")
    } else {
        format!("{total} {noun}")
    }
}

/// Rebuild the backup table
///
/// Sorts and filters the summaries, updates the match label and shows a
/// placeholder when nothing matches.
pub fn refresh_backup_list(
    list: &ListBox,
    summaries: &BTreeMap<String, VmBackupSummary>,
    column: BackupColumn,
    order: SortOrder,
    query: &str,
    match_label: &Label,
    on_restore: impl Fn(String) + 'static + Clone,
) {
    while let Some(child) = list.first_child() {
        list.remove(&child);
    }

    let rows = filter_summaries(sorted_summaries(summaries, column, order), query);
    let filtered = !query.trim().is_empty();
    match_label.set_text(&match_text(rows.len(), summaries.len(), filtered));

    if rows.is_empty() {
        let placeholder = if summaries.is_empty() {
            dialogs::status_page(
                "drive-multidisk-symbolic",
                "No backups",
                "No backups were found on the enabled remotes.",
            )
        } else {
            dialogs::status_page(
                "edit-find-symbolic",
                "No Matching VMs",
                "No VM name matches your filter.",
            )
        };
        list.append(&placeholder);
        return;
    }

    for summary in rows {
        let handler = on_restore.clone();
        let row = BackupRow::new(summary, move |vm_name| handler(vm_name));
        list.append(&row);
    }
}
