//! Logging
//!
//! Structured logging via `tracing`, rendered as human-readable text or one
//! JSON object per event. All log output goes to stderr so stdout stays
//! reserved for command results.
//!
//! Filter precedence: `SINSTALLER_LOG` > `RUST_LOG` > the level requested by
//! the caller (applied to the installer's own crates) > `info`.

use anyhow::Result;
use std::{io, str::FromStr, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable selecting the log filter
pub const LOG_ENV: &str = "SINSTALLER_LOG";

/// Environment variable selecting the log format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "SINSTALLER_LOG_FORMAT";

/// Crates whose events the requested level applies to
const OWN_TARGETS: [&str; 2] = ["sinstaller", "sinstaller_core"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// `json` (any case) selects JSON; anything else is text
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        })
    }
}

/// Initialize logging with an optional format (`"text"` or `"json"`)
///
/// Safe to call more than once; only the first call installs a subscriber.
/// When `format` is `None`, `SINSTALLER_LOG_FORMAT` is consulted.
///
/// ```rust
/// use sinstaller_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    init_with_level(format, None)
}

/// Like [`init`], with a default level for the installer's own crates
///
/// `level` only applies when neither `SINSTALLER_LOG` nor `RUST_LOG` is set.
pub fn init_with_level(format: Option<&str>, level: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter(level);
        let env_format = std::env::var(LOG_FORMAT_ENV).ok();
        let effective: LogFormat = format
            .or(env_format.as_deref())
            .unwrap_or("text")
            .parse()
            .unwrap_or_default();

        match effective {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {:?}", effective);
    });

    Ok(())
}

/// `sinstaller=<level>,sinstaller_core=<level>`
fn own_directive(level: &str) -> String {
    OWN_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

fn create_env_filter(level: Option<&str>) -> EnvFilter {
    let own = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    EnvFilter::new(select_directive(own.as_deref(), rust_log.as_deref(), level))
}

/// Directive in effect for the given `SINSTALLER_LOG`, `RUST_LOG` and level
fn select_directive(own: Option<&str>, rust_log: Option<&str>, level: Option<&str>) -> String {
    let valid = |spec: &&str| !spec.trim().is_empty() && EnvFilter::try_new(spec).is_ok();

    if let Some(spec) = own.filter(|s| !s.trim().is_empty()) {
        if valid(&spec) {
            return spec.to_string();
        }
        eprintln!("Invalid {} filter '{}', using 'info'", LOG_ENV, spec);
        return "info".to_string();
    }
    if let Some(spec) = rust_log.filter(valid) {
        return spec.to_string();
    }
    level
        .map(own_directive)
        .filter(|directive| valid(&directive.as_str()))
        .unwrap_or_else(|| "info".to_string())
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_multiple_calls_safe() {
        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init_with_level(Some("text"), Some("debug")).is_ok());
        assert!(init(Some("invalid")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" JSON ".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert_eq!("yaml".parse::<LogFormat>(), Ok(LogFormat::Text));
    }

    #[test]
    fn test_own_directive() {
        assert_eq!(own_directive("warn"), "sinstaller=warn,sinstaller_core=warn");
    }

    #[test]
    fn test_filter_precedence() {
        assert_eq!(select_directive(Some("trace"), Some("debug"), Some("warn")), "trace");
        assert_eq!(
            select_directive(None, Some("sinstaller_core=debug"), Some("warn")),
            "sinstaller_core=debug"
        );
        assert_eq!(
            select_directive(None, None, Some("warn")),
            "sinstaller=warn,sinstaller_core=warn"
        );
        assert_eq!(select_directive(None, None, None), "info");
    }

    #[test]
    fn test_invalid_filters_fall_back() {
        assert_eq!(select_directive(Some("sinstaller=loud"), Some("debug"), None), "info");
        assert_eq!(select_directive(Some("  "), Some("debug"), None), "debug");
        assert_eq!(
            select_directive(None, Some("sinstaller=loud"), Some("error")),
            "sinstaller=error,sinstaller_core=error"
        );
        assert_eq!(select_directive(None, None, Some("loud")), "info");
    }
}
