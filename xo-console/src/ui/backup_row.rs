use gtk::prelude::*;
use gtk::{Button, Label, Orientation};
use libadwaita as adw;
use adw::prelude::*;
use xo_console_common::VmBackupSummary;
use xo_console_common::format::{format_backup_age, format_backup_date};

/// One line per remote: `remote: tag1, tag2`
pub fn tags_by_remote_text(summary: &VmBackupSummary) -> String {
    summary
        .tags_by_remote
        .values()
        .map(|remote| format!("{}: {}", remote.remote_name, remote.tags.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Row of the backup table for one VM
pub struct BackupRow;

impl BackupRow {
    pub fn new<F>(summary: &VmBackupSummary, on_restore: F) -> adw::ExpanderRow
    where
        F: Fn(String) + 'static,
    {
        let row = adw::ExpanderRow::new();
        row.set_title(summary.vm_name());

        let now = chrono::Utc::now();
        row.set_subtitle(&format!(
            "Last backup {}  •  {}",
            format_backup_age(summary.last.date, now),
            summary.available_backups_label()
        ));

        let restore_btn = Button::builder()
            .icon_name("document-revert-symbolic")
            .tooltip_text("Restore a backup of this VM")
            .valign(gtk::Align::Center)
            .build();
        restore_btn.add_css_class("flat");

        let vm_name = summary.vm_name().to_string();
        restore_btn.connect_clicked(move |_| {
            on_restore(vm_name.clone());
        });
        row.add_suffix(&restore_btn);

        // Details: last backup date and tags per remote
        let last_row = adw::ActionRow::builder()
            .title("Last backup")
            .subtitle(format_backup_date(summary.last.date))
            .build();
        row.add_row(&last_row);

        let tags_row = adw::ActionRow::builder().title("Tags by remote").build();
        let tags_box = gtk::Box::new(Orientation::Vertical, 2);
        tags_box.set_margin_top(6);
        tags_box.set_margin_bottom(6);
        for line in tags_by_remote_text(summary).lines() {
            let label = Label::new(Some(line));
            label.set_halign(gtk::Align::End);
            label.add_css_class("dim-label");
            tags_box.append(&label);
        }
        tags_row.add_suffix(&tags_box);
        row.add_row(&tags_row);

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xo_console_common::{BackupType, Remote, RemoteBackupInfo, aggregate_backups};

    #[test]
    fn test_tags_by_remote_text() {
        let remote = |id: &str| Remote {
            id: id.to_string(),
            name: format!("{id}-name"),
            url: String::new(),
            enabled: true,
        };
        let info = |tag: &str| RemoteBackupInfo {
            datetime: 10,
            disks: Vec::new(),
            id: format!("{tag}.xva"),
            name: "db1".to_string(),
            tag: tag.to_string(),
            backup_type: BackupType::Xva,
            uuid: None,
        };

        let summaries = aggregate_backups(&[
            (remote("r1"), vec![info("daily"), info("weekly"), info("daily")]),
            (remote("r2"), vec![info("monthly")]),
        ]);

        assert_eq!(
            tags_by_remote_text(&summaries["db1"]),
            "r1-name: daily, weekly\nr2-name: monthly"
        );
    }
}
