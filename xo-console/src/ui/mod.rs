mod backup_list;
mod backup_row;
mod dashboard;
mod dialogs;
pub mod error_helpers;
mod notifications;
mod restore_dialog;
mod restore_page;
mod toolbar;

use crate::event_listener::start_event_listener;
use crate::settings;
use crate::user_preferences::UserPreferencesManager;
use crate::xo_client::XoClient;
use error_helpers::ErrorContext;
use gtk::glib;
use gtk::prelude::*;
use gtk::{Application, Label};
use libadwaita as adw;
use adw::prelude::*;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use xo_console_common::{
    ConsoleConfig, ObjectStore, Remote, ResourceSet, Topic, User, XoObject,
};

/// Whether a signed-in session is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Shared handles passed to every page and dialog
#[derive(Clone)]
pub struct ConsoleContext {
    pub app: Application,
    pub window: adw::ApplicationWindow,
    pub store: Rc<ObjectStore>,
    pub config: &'static ConsoleConfig,
    pub preferences: Rc<UserPreferencesManager>,
    /// Announced after sign-in and whenever the session is lost
    pub connection_changes: Topic<ConnectionState>,
    client: Rc<RefCell<Option<Arc<XoClient>>>>,
    /// Incremented on every connection attempt
    connection: Rc<Cell<u64>>,
}

impl ConsoleContext {
    /// The connected client, if any
    pub fn client(&self) -> Option<Arc<XoClient>> {
        self.client.borrow().clone()
    }

    fn set_client(&self, client: Option<Arc<XoClient>>) {
        *self.client.borrow_mut() = client;
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.connection.get() == attempt
    }
}

/// Everything fetched right after signing in
struct Session {
    client: Arc<XoClient>,
    user: User,
    objects: Vec<XoObject>,
    remotes: Vec<Remote>,
    users: Vec<User>,
    permissions: BTreeMap<String, Value>,
    resource_sets: Vec<ResourceSet>,
}

/// Collections the server does not announce changes for
///
/// `None` keeps what the store already holds.
struct Collections {
    remotes: Option<Vec<Remote>>,
    users: Option<Vec<User>>,
    permissions: Option<BTreeMap<String, Value>>,
    resource_sets: Option<Vec<ResourceSet>>,
}

impl Collections {
    fn fetch(client: &XoClient) -> Self {
        Self {
            remotes: client
                .get_remotes()
                .inspect_err(|e| log::warn!("Failed to poll remotes: {e}"))
                .ok(),
            // Only administrators may list users
            users: client
                .get_users()
                .inspect_err(|e| log::debug!("User list unavailable: {e}"))
                .ok(),
            permissions: client
                .get_permissions()
                .inspect_err(|e| log::warn!("Failed to poll permissions: {e}"))
                .ok(),
            resource_sets: client
                .get_resource_sets()
                .inspect_err(|e| log::warn!("Failed to poll resource sets: {e}"))
                .ok(),
        }
    }

    /// Store the fetched collections; unchanged ones are not announced
    fn apply(self, store: &ObjectStore) {
        let mut changed = 0;
        if let Some(permissions) = self.permissions {
            changed += usize::from(store.set_permissions(permissions));
        }
        if let Some(resource_sets) = self.resource_sets {
            changed += usize::from(store.set_resource_sets(resource_sets));
        }
        if let Some(users) = self.users {
            changed += usize::from(store.set_users(users));
        }
        if let Some(remotes) = self.remotes {
            changed += usize::from(store.set_remotes(remotes));
        }
        if changed > 0 {
            log::debug!("{changed} polled collections changed");
        }
    }
}

struct BootstrapFailure {
    context: ErrorContext,
    message: String,
}

fn bootstrap(
    config: &ConsoleConfig,
    events: async_channel::Sender<crate::xo_client::ClientEvent>,
) -> Result<Session, BootstrapFailure> {
    let client = XoClient::connect(config, events).map_err(|e| BootstrapFailure {
        context: ErrorContext::Connection,
        message: format!("{e:#}"),
    })?;

    let user = client.sign_in(config).map_err(|e| BootstrapFailure {
        context: ErrorContext::Authentication,
        message: format!("{e:#}"),
    })?;
    log::info!("Signed in as {}", user.email);

    let connection_failure = |e: crate::xo_client::RpcError| BootstrapFailure {
        context: ErrorContext::Connection,
        message: e.to_string(),
    };
    let objects = client.get_all_objects().map_err(connection_failure)?;
    let remotes = client.get_remotes().map_err(|e| BootstrapFailure {
        context: ErrorContext::BackupList,
        message: e.to_string(),
    })?;

    // Only administrators may list users
    let users = client.get_users().unwrap_or_else(|e| {
        log::debug!("User list unavailable: {e}");
        Vec::new()
    });
    let permissions = client.get_permissions().unwrap_or_else(|e| {
        log::warn!("Failed to fetch permissions: {e}");
        BTreeMap::new()
    });
    let resource_sets = client.get_resource_sets().unwrap_or_else(|e| {
        log::warn!("Failed to fetch resource sets: {e}");
        Vec::new()
    });

    Ok(Session {
        client: Arc::new(client),
        user,
        objects,
        remotes,
        users,
        permissions,
        resource_sets,
    })
}

pub struct MainWindow;

impl MainWindow {
    pub fn new(app: &Application) -> adw::ApplicationWindow {
        let config_problem = settings::init().err();
        let config = settings::config();

        let preferences = UserPreferencesManager::new().unwrap_or_else(|e| {
            log::warn!("Falling back to temporary preferences: {e:#}");
            UserPreferencesManager::with_path(
                std::env::temp_dir().join("xo-console-preferences.json"),
            )
        });

        let window = adw::ApplicationWindow::builder()
            .application(app)
            .title("XO Console")
            .default_width(config.ui_window_width)
            .default_height(config.ui_window_height)
            .build();

        let ctx = ConsoleContext {
            app: app.clone(),
            window: window.clone(),
            store: Rc::new(ObjectStore::new()),
            config,
            preferences: Rc::new(preferences),
            connection_changes: Topic::new(),
            client: Rc::new(RefCell::new(None)),
            connection: Rc::new(Cell::new(0)),
        };

        let view_stack = adw::ViewStack::new();
        let dashboard = dashboard::DashboardPage::new(&ctx);
        view_stack.add_titled_with_icon(
            &dashboard.widget,
            Some("dashboard"),
            "Dashboard",
            "speedometer-symbolic",
        );
        let restore = restore_page::RestorePage::new(&ctx);
        view_stack.add_titled_with_icon(
            &restore.widget,
            Some("restore"),
            "Restore",
            "document-revert-symbolic",
        );

        // Header bar
        let header = adw::HeaderBar::new();
        let switcher = adw::ViewSwitcher::builder()
            .stack(&view_stack)
            .policy(adw::ViewSwitcherPolicy::Wide)
            .build();
        header.set_title_widget(Some(&switcher));

        let reconnect_btn = gtk::Button::builder()
            .icon_name("network-wired-symbolic")
            .tooltip_text("Reconnect")
            .build();
        header.pack_end(&reconnect_btn);

        // Connection status
        let status_label = Label::new(None);
        status_label.add_css_class("caption");
        status_label.add_css_class("dim-label");
        status_label.set_margin_end(12);
        header.pack_end(&status_label);

        let toolbar_view = adw::ToolbarView::new();
        toolbar_view.add_top_bar(&header);
        toolbar_view.set_content(Some(&view_stack));

        let toast_overlay = adw::ToastOverlay::new();
        toast_overlay.set_child(Some(&toolbar_view));
        window.set_content(Some(&toast_overlay));

        // Pages own store subscriptions; release them with the window
        let pages = RefCell::new(Some((dashboard, restore)));
        window.connect_destroy(move |_| {
            pages.borrow_mut().take();
        });

        {
            let ctx = ctx.clone();
            let status_label = status_label.clone();
            reconnect_btn.connect_clicked(move |_| connect(&ctx, &status_label));
        }

        if let Some(report) = config_problem {
            error_helpers::show_error_with_context(&window, ErrorContext::Configuration, &report);
        }

        connect(&ctx, &status_label);

        window
    }
}

/// Connect, sign in and load the collections on a worker thread
fn connect(ctx: &ConsoleContext, status_label: &Label) {
    let attempt = ctx.connection.get() + 1;
    ctx.connection.set(attempt);
    ctx.set_client(None);
    status_label.set_text("Connecting…");

    let (events_sender, events) = async_channel::unbounded();
    let (sender, receiver) = async_channel::bounded(1);
    let config = ctx.config;
    std::thread::spawn(move || {
        let _ = sender.send_blocking(bootstrap(config, events_sender));
    });

    let ctx = ctx.clone();
    let status_label = status_label.clone();
    glib::spawn_future_local(async move {
        let Ok(result) = receiver.recv().await else {
            log::error!("Connection worker exited without a result");
            return;
        };

        if !ctx.is_current(attempt) {
            log::debug!("Ignoring superseded connection attempt #{attempt}");
            return;
        }

        let session = match result {
            Ok(session) => session,
            Err(failure) => {
                log::error!("Connection failed: {}", failure.message);
                status_label.set_text("Disconnected");
                ctx.connection_changes.publish(&ConnectionState::Disconnected);
                error_helpers::show_error_with_context(
                    &ctx.window,
                    failure.context,
                    &failure.message,
                );
                return;
            }
        };

        status_label.set_text(&session.user.email);
        ctx.set_client(Some(session.client));

        let store = &ctx.store;
        store.set_current_user(Some(session.user));
        store.set_permissions(session.permissions);
        store.set_resource_sets(session.resource_sets);
        store.set_users(session.users);
        store.replace_objects(session.objects);
        store.set_remotes(session.remotes);
        log::info!("Loaded {} objects", store.object_count());
        ctx.connection_changes.publish(&ConnectionState::Connected);

        start_polling(&ctx, attempt);

        let listener_ctx = ctx.clone();
        start_event_listener(Rc::clone(&ctx.store), events, move |reason| {
            if !listener_ctx.is_current(attempt) {
                return;
            }
            log::warn!("Disconnected from XO: {reason}");
            listener_ctx.set_client(None);
            status_label.set_text("Disconnected");
            listener_ctx
                .connection_changes
                .publish(&ConnectionState::Disconnected);
            notifications::notify_disconnected(&listener_ctx.app, reason);
            dialogs::show_toast(&listener_ctx.window, "Connection to XO lost");
        });
    });
}

/// Periodically refetch the collections of connection `attempt`
///
/// Stops once the connection is lost or superseded.
fn start_polling(ctx: &ConsoleContext, attempt: u64) {
    let interval = ctx.config.refresh_interval_secs;
    let in_flight = Rc::new(Cell::new(false));
    let ctx = ctx.clone();

    glib::timeout_add_seconds_local(interval, move || {
        let client = match ctx.client() {
            Some(client) if ctx.is_current(attempt) => client,
            _ => {
                log::debug!("Polling for connection #{attempt} stopped");
                return glib::ControlFlow::Break;
            }
        };
        if in_flight.get() {
            return glib::ControlFlow::Continue;
        }
        in_flight.set(true);

        let (sender, receiver) = async_channel::bounded(1);
        std::thread::spawn(move || {
            let _ = sender.send_blocking(Collections::fetch(&client));
        });

        let ctx = ctx.clone();
        let in_flight = Rc::clone(&in_flight);
        glib::spawn_future_local(async move {
            if let Ok(collections) = receiver.recv().await {
                if ctx.is_current(attempt) {
                    collections.apply(&ctx.store);
                }
            }
            in_flight.set(false);
        });

        glib::ControlFlow::Continue
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use xo_console_common::StoreChange;

    fn remote(id: &str) -> Remote {
        Remote {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("nfs://{id}"),
            enabled: true,
        }
    }

    fn polled(remotes: Option<Vec<Remote>>) -> Collections {
        Collections {
            remotes,
            users: None,
            permissions: Some(BTreeMap::new()),
            resource_sets: Some(Vec::new()),
        }
    }

    #[test]
    fn test_polled_collections_announce_only_changes() {
        let store = ObjectStore::new();
        store.set_remotes(vec![remote("r1")]);

        let changes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&changes);
        let _subscription = store.subscribe(move |change| seen.borrow_mut().push(*change));

        polled(Some(vec![remote("r1")])).apply(&store);
        // A failed remote poll keeps the known remotes
        polled(None).apply(&store);
        assert!(changes.borrow().is_empty());
        assert_eq!(store.enabled_remotes(), vec![remote("r1")]);

        polled(Some(vec![remote("r1"), remote("r2")])).apply(&store);
        assert_eq!(*changes.borrow(), vec![StoreChange::Remotes]);
        assert_eq!(store.enabled_remotes().len(), 2);
    }
}
