// Process-wide console configuration

use once_cell::sync::OnceCell;
use xo_console_common::ConsoleConfig;
use xo_console_common::validation::validate_config;

static CONFIG: OnceCell<ConsoleConfig> = OnceCell::new();

/// Load, validate and install the configuration
///
/// An unreadable file falls back to defaults. Invalid values are kept.
/// Either way the error report is returned so the window can show it.
pub fn init() -> Result<&'static ConsoleConfig, String> {
    let (config, problem) = match ConsoleConfig::new() {
        Ok(config) => match validate_config(&config) {
            Ok(()) => (config, None),
            Err(errors) => {
                let report = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                (config, Some(report))
            }
        },
        Err(e) => (ConsoleConfig::default(), Some(format!("{e:#}"))),
    };

    let config = CONFIG.get_or_init(|| config);
    match problem {
        Some(report) => {
            log::error!("Invalid configuration:\n{report}");
            Err(report)
        }
        None => Ok(config),
    }
}

/// The installed configuration, or defaults before [`init`]
pub fn config() -> &'static ConsoleConfig {
    static DEFAULT: OnceCell<ConsoleConfig> = OnceCell::new();
    CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT.get_or_init(ConsoleConfig::default))
}
