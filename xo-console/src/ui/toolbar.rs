//! Toolbar of the restore page
//!
//! Holds the VM name filter, the sort controls and the refresh button.

use gtk::prelude::*;
use gtk::{Button, DropDown, Label, Orientation, SearchEntry, ToggleButton};
use xo_console_common::{BackupColumn, SortOrder};

/// Widgets of the restore toolbar
pub struct RestoreToolbar {
    pub container: gtk::Box,
    pub search_entry: SearchEntry,
    pub sort_column: DropDown,
    pub sort_order: ToggleButton,
    pub refresh_btn: Button,
    pub match_label: Label,
}

const COLUMNS: [BackupColumn; 2] = [BackupColumn::LastBackup, BackupColumn::VmName];

pub fn column_from_index(index: u32) -> BackupColumn {
    COLUMNS
        .get(index as usize)
        .copied()
        .unwrap_or_default()
}

fn column_index(column: BackupColumn) -> u32 {
    COLUMNS.iter().position(|c| *c == column).unwrap_or(0) as u32
}

pub fn order_icon(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "view-sort-ascending-symbolic",
        SortOrder::Descending => "view-sort-descending-symbolic",
    }
}

/// Create the restore toolbar initialised with the saved sort
pub fn create_restore_toolbar(column: BackupColumn, order: SortOrder) -> RestoreToolbar {
    let container = gtk::Box::new(Orientation::Horizontal, 12);
    container.set_margin_top(18);
    container.set_margin_bottom(12);
    container.set_margin_start(12);
    container.set_margin_end(12);

    let search_entry = SearchEntry::builder()
        .placeholder_text("Filter by VM name")
        .hexpand(true)
        .build();
    container.append(&search_entry);

    let sort_column = DropDown::from_strings(&["Last backup", "VM name"]);
    sort_column.set_selected(column_index(column));
    sort_column.set_tooltip_text(Some("Sort column"));
    container.append(&sort_column);

    let sort_order = ToggleButton::builder()
        .icon_name(order_icon(order))
        .tooltip_text("Toggle sort order")
        .active(order == SortOrder::Ascending)
        .build();
    sort_order.add_css_class("flat");
    container.append(&sort_order);

    let refresh_btn = Button::builder()
        .icon_name("view-refresh-symbolic")
        .tooltip_text("Refresh backup list")
        .build();
    refresh_btn.add_css_class("flat");
    container.append(&refresh_btn);

    let match_label = Label::new(None);
    match_label.add_css_class("dim-label");
    match_label.set_halign(gtk::Align::Start);
    match_label.set_margin_start(12);

    RestoreToolbar {
        container,
        search_entry,
        sort_column,
        sort_order,
        refresh_btn,
        match_label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index_round_trip() {
        for column in COLUMNS {
            assert_eq!(column_from_index(column_index(column)), column);
        }
        assert_eq!(column_from_index(42), BackupColumn::LastBackup);
    }
}
