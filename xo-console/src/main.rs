mod event_listener;
mod remote_lister;
mod settings;
mod ui;
mod user_preferences;
mod xo_client;

use env_logger::Env;
use gtk::prelude::*;
use gtk::{glib, Application};

const APP_ID: &str = "org.xen_orchestra.Console";

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let app = Application::builder()
        .application_id(APP_ID)
        .build();

    app.connect_activate(build_ui);
    app.run()
}

fn build_ui(app: &Application) {
    if let Err(e) = libadwaita::init() {
        log::error!("Failed to initialize libadwaita: {e}");
    }

    let window = ui::MainWindow::new(app);
    window.present();
}
