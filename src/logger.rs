use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use backend_plugin::LogLevel;
use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

/// The leveled-logging interface injected into the router at construction.
///
/// The router and its workers only ever talk to this trait, one call per
/// level, so embedders can swap in their own sink. Implementations must be
/// safe for concurrent use by all workers and the main task.
#[async_trait]
#[typetag::serde]
pub trait LoggerType: Send + Sync {
    fn log(&self, level: LogLevel, context: &str, msg: &str);
    fn clone_box(&self) -> Box<dyn LoggerType>;
    fn debug_box(&self) -> String;
}

#[derive(Serialize, Deserialize)]
pub struct Logger(pub Box<dyn LoggerType>);

impl Logger {
    pub fn into_inner(self) -> Box<dyn LoggerType> {
        self.0
    }

    pub fn log(&self, level: LogLevel, context: &str, msg: &str) {
        self.0.log(level, context, msg)
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Logger(self.0.clone_box())
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Default logger: forwards every level to the matching `tracing` macro.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[typetag::serde]
#[async_trait]
impl LoggerType for TracingLogger {
    fn log(&self, level: LogLevel, context: &str, msg: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(%context, "{msg}"),
            LogLevel::Debug => tracing::debug!(%context, "{msg}"),
            LogLevel::Info => tracing::info!(%context, "{msg}"),
            LogLevel::Warn => tracing::warn!(%context, "{msg}"),
            LogLevel::Error => tracing::error!(%context, "{msg}"),
            LogLevel::Critical => tracing::error!(%context, "[CRITICAL] {msg}"),
        }
    }

    fn clone_box(&self) -> Box<dyn LoggerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "TracingLogger".to_string()
    }
}

/// Wire up the tracing subscriber: an `EnvFilter` built from `log_level`,
/// a pretty stdout layer, and (when `log_dir` is given) a daily-rolling
/// text log file.
///
/// Returns the `Logger` to inject into the router. Call once per process;
/// a second call fails because the global subscriber is already set.
pub fn init_tracing(log_level: &str, log_dir: Option<PathBuf>) -> Result<Logger> {
    let env_filter = EnvFilter::new(log_level);

    let fmt_layer = fmt::layer().with_thread_names(true);

    let file_layer = log_dir.map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, "courier.log");
        fmt::Layer::default().with_writer(appender).with_ansi(false)
    });

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()?;

    Ok(Logger(Box::new(TracingLogger::new())))
}
