//! User-friendly error messages with recovery suggestions
//!
//! Turns RPC and configuration errors into a title, a short message and
//! optional details shown in an error dialog.

use libadwaita as adw;
use adw::prelude::*;

/// What the user was doing when the error happened
#[derive(Debug, Clone, Copy)]
pub enum ErrorContext {
    Connection,
    Authentication,
    BackupList,
    Restore,
    Configuration,
}

/// Show an error dialog with context and recovery suggestions
pub fn show_error_with_context(
    window: &adw::ApplicationWindow,
    context: ErrorContext,
    error: &str,
) {
    let (title, message, details) = format_error_message(context, error);

    let dialog = adw::MessageDialog::new(Some(window), Some(&title), Some(&message));

    if let Some(detail_text) = details {
        dialog.set_body(&format!("{message}\n\n{detail_text}"));
    }

    dialog.add_response("ok", "OK");
    dialog.set_default_response(Some("ok"));
    dialog.set_close_response("ok");
    dialog.present();
}

fn format_error_message(context: ErrorContext, error: &str) -> (String, String, Option<String>) {
    match context {
        ErrorContext::Connection => format_connection_error(error),
        ErrorContext::Authentication => format_authentication_error(error),
        ErrorContext::BackupList => format_backup_list_error(error),
        ErrorContext::Restore => format_restore_error(error),
        ErrorContext::Configuration => format_configuration_error(error),
    }
}

fn format_connection_error(error: &str) -> (String, String, Option<String>) {
    let (message, recovery) = if error.contains("Connection refused") {
        (
            "The XO server refused the connection.".to_string(),
            "Check that xo-server is running and that the URL and port are correct.".to_string(),
        )
    } else if error.contains("certificate") || error.contains("InvalidCertificate") {
        (
            "The server certificate is not trusted.".to_string(),
            "Install the server's CA certificate in the system trust store.".to_string(),
        )
    } else if error.contains("failed to lookup") || error.contains("Name or service not known") {
        (
            "The server address could not be resolved.".to_string(),
            "Check the server_url setting in config.toml.".to_string(),
        )
    } else {
        (
            "Unable to reach the XO server.".to_string(),
            "Check your network connection and the server_url setting.".to_string(),
        )
    };

    (
        "Connection Failed".to_string(),
        message,
        Some(format!("{recovery}\n\nTechnical details: {error}")),
    )
}

fn format_authentication_error(error: &str) -> (String, String, Option<String>) {
    let recovery = if error.contains("No token or credentials") {
        "Set a token, or an email and password, in config.toml or XO_CONSOLE_TOKEN."
    } else {
        "The token may have expired. Create a new authentication token and try again."
    };

    (
        "Authentication Failed".to_string(),
        "The XO server rejected the credentials.".to_string(),
        Some(format!("{recovery}\n\nTechnical details: {error}")),
    )
}

fn format_backup_list_error(error: &str) -> (String, String, Option<String>) {
    (
        "Failed to Load Backups".to_string(),
        "Unable to retrieve the list of remotes.".to_string(),
        Some(format!(
            "This could be a temporary issue. Try refreshing the list.\n\nTechnical details: {error}"
        )),
    )
}

fn format_restore_error(error: &str) -> (String, String, Option<String>) {
    let (message, recovery) = if error.contains("no space") || error.contains("SR_BACKEND_FAILURE_44") {
        (
            "The target SR does not have enough free space.".to_string(),
            Some("Choose another SR or free some space before restoring.".to_string()),
        )
    } else if error.contains("not enough permissions") || error.contains("unauthorized") {
        (
            "You are not allowed to restore on this SR.".to_string(),
            Some("Ask an administrator for permissions on the target pool.".to_string()),
        )
    } else if error.contains("timed out") {
        (
            "The server did not answer in time.".to_string(),
            Some(
                "Large imports may still be running. Check the tasks on the server before retrying."
                    .to_string(),
            ),
        )
    } else {
        (
            "An error occurred while restoring the backup.".to_string(),
            Some(format!("Technical details: {error}")),
        )
    };

    ("Restore Failed".to_string(), message, recovery)
}

fn format_configuration_error(error: &str) -> (String, String, Option<String>) {
    let message = if error.contains("parse") || error.contains("TOML") {
        "The configuration file is invalid."
    } else {
        "The configuration contains invalid values."
    };

    (
        "Configuration Error".to_string(),
        message.to_string(),
        Some(format!(
            "Default settings are used until config.toml is fixed.\n\n{error}"
        )),
    )
}
