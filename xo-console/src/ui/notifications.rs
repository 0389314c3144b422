use gio::prelude::*;
use gtk::Application;
use xo_console_common::{RestoreError, RestoreOutcome};

/// Priority levels for notifications
#[derive(Debug, Clone, Copy)]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

impl NotificationPriority {
    fn to_gio_priority(self) -> gio::NotificationPriority {
        match self {
            NotificationPriority::Low => gio::NotificationPriority::Low,
            NotificationPriority::Normal => gio::NotificationPriority::Normal,
            NotificationPriority::High => gio::NotificationPriority::High,
        }
    }
}

/// Send a desktop notification
pub fn send_notification(
    app: &Application,
    title: &str,
    body: &str,
    priority: NotificationPriority,
) {
    let notification = gio::Notification::new(title);
    notification.set_body(Some(body));
    notification.set_priority(priority.to_gio_priority());

    let icon = gio::ThemedIcon::new("drive-multidisk-symbolic");
    notification.set_icon(&icon);

    app.send_notification(None, &notification);
}

/// Info notification sent when an import is submitted
pub fn notify_restore_started(app: &Application, vm_name: &str) {
    send_notification(
        app,
        "VM import",
        &format!("Restoring {vm_name}, this may take a while"),
        NotificationPriority::Low,
    );
}

pub fn notify_restore_completed(app: &Application, vm_name: &str, outcome: &RestoreOutcome) {
    let body = if outcome.started {
        format!("{vm_name} restored and started")
    } else {
        format!("{vm_name} restored")
    };
    send_notification(app, "VM import", &body, NotificationPriority::Normal);
}

/// Error notification carrying the failure message
pub fn notify_restore_failed(app: &Application, error: &RestoreError) {
    send_notification(
        app,
        error.title(),
        &error.to_string(),
        NotificationPriority::High,
    );
}

pub fn notify_disconnected(app: &Application, reason: &str) {
    send_notification(
        app,
        "Connection lost",
        &format!("The XO server connection was closed ({reason})"),
        NotificationPriority::High,
    );
}
