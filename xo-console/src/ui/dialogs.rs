use gtk::prelude::*;
use libadwaita as adw;
use adw::prelude::*;

/// Show an error dialog
pub fn show_error(window: &adw::ApplicationWindow, title: &str, message: &str) {
    let dialog = adw::MessageDialog::new(Some(window), Some(title), Some(message));
    dialog.add_response("ok", "OK");
    dialog.set_default_response(Some("ok"));
    dialog.set_close_response("ok");
    dialog.present();
}

/// Show a toast notification
pub fn show_toast(window: &adw::ApplicationWindow, message: &str) {
    if let Some(content) = window.content() {
        if let Ok(toast_overlay) = content.downcast::<adw::ToastOverlay>() {
            let toast = adw::Toast::new(message);
            toast.set_timeout(3);
            toast_overlay.add_toast(toast);
            return;
        }
    }

    log::info!("{message}");
}

/// Build a placeholder status page with a large icon
pub fn status_page(icon_name: &str, title: &str, description: &str) -> adw::StatusPage {
    let page = adw::StatusPage::new();
    page.set_title(title);
    page.set_description(Some(description));

    let icon = gtk::Image::from_icon_name(icon_name);
    icon.set_pixel_size(64);
    page.set_child(Some(&icon));
    page.set_vexpand(true);
    page
}

/// Status page with a spinner, shown while data loads
pub fn loading_page(title: &str) -> adw::StatusPage {
    let page = adw::StatusPage::new();
    page.set_title(title);

    let spinner = gtk::Spinner::new();
    spinner.set_size_request(32, 32);
    spinner.start();
    page.set_child(Some(&spinner));
    page.set_vexpand(true);
    page
}
