use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "lumen_engine=debug,wgpu=warn"). When unset, `RUST_LOG` is consulted,
/// then `default_level`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub default_level: log::LevelFilter,
    /// Caps wgpu's own crates at `warn` unless the filter names them.
    pub quiet_wgpu: bool,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            default_level: log::LevelFilter::Info,
            quiet_wgpu: true,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

const WGPU_CRATES: [&str; 3] = ["wgpu_core", "wgpu_hal", "naga"];

/// Builds the effective filter string from the config and `RUST_LOG`.
fn filter_spec(config: &LoggingConfig, rust_log: Option<&str>) -> String {
    let mut spec = config
        .env_filter
        .as_deref()
        .or(rust_log)
        .map(str::to_owned)
        .unwrap_or_else(|| config.default_level.to_string().to_lowercase());

    if config.quiet_wgpu {
        for name in WGPU_CRATES {
            if !spec.contains(name) {
                spec.push_str(&format!(",{name}=warn"));
            }
        }
    }
    spec
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// This function is idempotent; subsequent calls are ignored.
/// Intended usage is early in `main`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let rust_log = std::env::var("RUST_LOG").ok();
        let spec = filter_spec(&config, rust_log.as_deref());

        env_logger::Builder::new()
            .parse_filters(&spec)
            .write_style(config.write_style)
            .init();

        log::debug!("logging initialized ({spec})");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_beats_rust_log() {
        let config = LoggingConfig {
            env_filter: Some("lumen_engine=trace".into()),
            quiet_wgpu: false,
            ..Default::default()
        };
        assert_eq!(filter_spec(&config, Some("error")), "lumen_engine=trace");
    }

    #[test]
    fn falls_back_to_default_level() {
        let config = LoggingConfig {
            default_level: log::LevelFilter::Debug,
            quiet_wgpu: false,
            ..Default::default()
        };
        assert_eq!(filter_spec(&config, None), "debug");
        assert_eq!(filter_spec(&config, Some("warn")), "warn");
    }

    #[test]
    fn wgpu_is_capped_unless_named() {
        let config = LoggingConfig::default();
        assert_eq!(
            filter_spec(&config, Some("info,wgpu_hal=debug")),
            "info,wgpu_hal=debug,wgpu_core=warn,naga=warn"
        );
    }
}
