use env_logger::fmt::style::{AnsiColor, Style};
use env_logger::Builder;
use log::{Level, LevelFilter, SetLoggerError};

use std::io::Write;

pub const ENV_LEVEL: &str = "NEWENGINE_LOG";
pub const ENV_COLORS: &str = "NEWENGINE_LOG_COLORS";
pub const ENV_MODULE: &str = "NEWENGINE_LOG_MODULE";

#[derive(Debug, Clone)]
pub struct ConsoleLoggerConfig {
    pub level: LevelFilter,
    pub colors: bool,
    pub include_module: bool,
}

impl ConsoleLoggerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (environment, CLI, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup(ENV_LEVEL)
            .and_then(|v| v.trim().parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Info);
        let colors = lookup(ENV_COLORS).map(|v| v != "0").unwrap_or(true);
        let include_module = lookup(ENV_MODULE).map(|v| v != "0").unwrap_or(true);

        Self {
            level,
            colors,
            include_module,
        }
    }
}

impl Default for ConsoleLoggerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn level_style(level: Level, colors: bool) -> Style {
    if !colors {
        return Style::new();
    }
    match level {
        Level::Error => Style::new().fg_color(Some(AnsiColor::Red.into())).bold(),
        Level::Warn => Style::new().fg_color(Some(AnsiColor::Yellow.into())).bold(),
        Level::Info => Style::new().fg_color(Some(AnsiColor::Green.into())),
        Level::Debug => Style::new().fg_color(Some(AnsiColor::Blue.into())),
        Level::Trace => Style::new().fg_color(Some(AnsiColor::Magenta.into())),
    }
}

/// Process-wide console logger on top of `env_logger`.
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

    /// Installs the global logger. Calling it again on the same instance is a no-op;
    /// fails if some other logger is already installed.
    pub fn init(&mut self) -> Result<(), SetLoggerError> {
        if self.initialized {
            return Ok(());
        }

        let mut builder = Builder::new();
        builder.filter_level(self.config.level);

        let config = self.config.clone();
        builder.format(move |buf, record| {
            let style = level_style(record.level(), config.colors);

            if config.include_module {
                writeln!(
                    buf,
                    "[{style}{:<5}{style:#}] {:<25} {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            } else {
                writeln!(buf, "[{style}{:<5}{style:#}] {}", record.level(), record.args())
            }
        });

        builder.try_init()?;

        self.initialized = true;
        Ok(())
    }
}
