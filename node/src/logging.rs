//! # Logging
//!
//! `fsp-node` logs through `tracing` to stderr only. Stdout belongs to the
//! replay's JSON outcome lines, the `check` summary and the `--metrics` dump.
//!
//! Filter resolution, first match wins:
//!
//! 1. `RUST_LOG`, when set and parseable.
//! 2. `--log-level` / `FSP_LOG_LEVEL`.
//! 3. [`DEFAULT_DIRECTIVES`], when the value above does not parse.
//!
//! `--log-format` / `FSP_LOG_FORMAT` selects `pretty` or `json` lines.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Info for the three workspace crates, nothing from dependencies.
pub const DEFAULT_DIRECTIVES: &str = "fsp_node=info,fsp_protocol=info,fsp_contracts=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, one event per line with file and line.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `json` in any case selects [`LogFormat::Json`]; anything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

fn resolve_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global subscriber. Must run once, before the first event.
pub fn init_logging(level: &str, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = resolve_filter(rust_log.as_deref(), level);

    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
        ),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();

    tracing::debug!(?format, "logging ready");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(filter: EnvFilter) -> String {
        filter.to_string().to_lowercase()
    }

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy(" json "), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn rust_log_takes_precedence_over_level() {
        let filter = resolve_filter(Some("fsp_protocol=trace"), DEFAULT_DIRECTIVES);
        let text = directives(filter);
        assert!(text.contains("fsp_protocol=trace"));
        assert!(!text.contains("fsp_node"));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let text = directives(resolve_filter(Some("fsp_node=loud"), "fsp_node=louder"));
        assert!(text.contains("fsp_node=info"));
        assert!(text.contains("fsp_contracts=info"));

        let text = directives(resolve_filter(None, "fsp_contracts=debug"));
        assert!(text.contains("fsp_contracts=debug"));
    }
}
