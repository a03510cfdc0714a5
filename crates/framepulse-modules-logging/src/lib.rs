//! Console logging for FramePulse hosts.
//!
//! `FRAMEPULSE_LOG` sets the host level. The scheduler core logs one debug
//! line per register/unregister, which floods a busy host, so it gets its own
//! level through `FRAMEPULSE_LOG_CORE` and stays at `info` unless asked.

use env_logger::Builder;
use framepulse_core::{SchedulerError, SchedulerResult};
use log::LevelFilter;

use std::io::Write;

const CORE_TARGET: &str = "framepulse_core";

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleLoggerConfig {
    /// Level for the host and every crate except the scheduler core.
    pub level: LevelFilter,
    /// Level for `framepulse_core` targets.
    pub core_level: LevelFilter,
    pub colors: bool,
    /// Print the record target column.
    pub show_target: bool,
}

impl ConsoleLoggerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = parse_level(lookup("FRAMEPULSE_LOG")).unwrap_or(LevelFilter::Info);
        // The core never logs louder than the host asked for.
        let core_level = parse_level(lookup("FRAMEPULSE_LOG_CORE"))
            .unwrap_or(LevelFilter::Info)
            .min(level);

        Self {
            level,
            core_level,
            colors: flag(lookup("FRAMEPULSE_LOG_COLORS"), true),
            show_target: flag(lookup("FRAMEPULSE_LOG_MODULE"), true),
        }
    }
}

impl Default for ConsoleLoggerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_level(raw: Option<String>) -> Option<LevelFilter> {
    raw?.trim().parse::<LevelFilter>().ok()
}

fn flag(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(str::trim) {
        Some("0") | Some("false") | Some("off") => false,
        Some(_) => true,
        None => default,
    }
}

/// Installs the process-wide `log` backend once.
pub struct ConsoleLogger {
    config: ConsoleLoggerConfig,
    initialized: bool,
}

impl ConsoleLogger {
    #[inline]
    pub fn new(config: ConsoleLoggerConfig) -> Self {
        Self {
            config,
            initialized: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &ConsoleLoggerConfig {
        &self.config
    }

    pub fn init(&mut self) -> SchedulerResult<()> {
        if self.initialized {
            return Ok(());
        }

        let mut builder = Builder::new();
        builder
            .filter_level(self.config.level)
            .filter_module(CORE_TARGET, self.config.core_level);

        let ConsoleLoggerConfig {
            colors,
            show_target,
            ..
        } = self.config;
        builder.format(move |buf, record| {
            let level = record.level();
            let style = if colors {
                buf.default_level_style(level)
            } else {
                Default::default()
            };
            // Core targets are long module paths; the leaf is enough to tell them apart.
            let target = record
                .target()
                .strip_prefix("framepulse_core::")
                .unwrap_or(record.target());

            if show_target {
                writeln!(
                    buf,
                    "[{style}{level:<5}{style:#}] {target:<12} {}",
                    record.args()
                )
            } else {
                writeln!(buf, "[{style}{level:<5}{style:#}] {}", record.args())
            }
        });

        builder
            .try_init()
            .map_err(|e| SchedulerError::other(format!("logger init failed: {e}")))?;

        self.initialized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ConsoleLoggerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConsoleLoggerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_info_with_colors_and_targets() {
        let c = config(&[]);
        assert_eq!(c.level, LevelFilter::Info);
        assert_eq!(c.core_level, LevelFilter::Info);
        assert!(c.colors);
        assert!(c.show_target);
    }

    #[test]
    fn debug_host_keeps_core_registrations_quiet() {
        let c = config(&[("FRAMEPULSE_LOG", "debug")]);
        assert_eq!(c.level, LevelFilter::Debug);
        assert_eq!(c.core_level, LevelFilter::Info);

        let c = config(&[("FRAMEPULSE_LOG", "debug"), ("FRAMEPULSE_LOG_CORE", "trace")]);
        assert_eq!(c.core_level, LevelFilter::Debug);
    }

    #[test]
    fn core_never_outranks_host_level() {
        let c = config(&[("FRAMEPULSE_LOG", "warn"), ("FRAMEPULSE_LOG_CORE", "debug")]);
        assert_eq!(c.core_level, LevelFilter::Warn);
    }

    #[test]
    fn flags_and_bad_levels() {
        let c = config(&[
            ("FRAMEPULSE_LOG", "chatty"),
            ("FRAMEPULSE_LOG_COLORS", "0"),
            ("FRAMEPULSE_LOG_MODULE", "off"),
        ]);
        assert_eq!(c.level, LevelFilter::Info);
        assert!(!c.colors);
        assert!(!c.show_target);
    }
}
