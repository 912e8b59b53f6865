use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

pub trait TunerLogger: Send + Sync {
    fn log(&self, level: LogLevel, component: &str, msg: &str);
}

/// Forwards to the `log` facade, using the component name as the target.
pub struct LogCrateLogger;

impl LogCrateLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl TunerLogger for LogCrateLogger {
    fn log(&self, level: LogLevel, component: &str, msg: &str) {
        log::log!(target: component, log::Level::from(level), "{}", msg);
    }
}

/// Drops everything. Handy for tests that exercise noisy failure paths.
pub struct NullLogger;

impl TunerLogger for NullLogger {
    fn log(&self, _level: LogLevel, _component: &str, _msg: &str) {}
}

/// Default logger shared by components that were not handed one.
pub fn default_logger() -> Arc<dyn TunerLogger> {
    LogCrateLogger::new()
}

/// Install `env_logger` as the global backend. Honours `RUST_LOG`, defaults to `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
