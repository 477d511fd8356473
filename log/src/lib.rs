//! # Logging Library
//!
//! A process-wide logging facade with configurable levels and colored
//! console output. One logger is installed at startup with [`set_logger`];
//! every thread (including tokio workers) then sees the same instance.
use colored::Colorize;
use once_cell::sync::OnceCell;
use std::fmt::Display;
use std::sync::Arc;

/// Submodule containing advanced logger implementations
pub mod logger;

static LOGGER: OnceCell<Arc<dyn Logger + Send + Sync>> = OnceCell::new();

/// Sets the global logger instance for the application
///
/// # Arguments
///
/// * `logger` - A thread-safe reference to a logger implementation
///
/// # Returns
///
/// * `Ok(())` if the logger was successfully set
/// * `Err(LogError::AlreadyInitialized)` if a logger has already been installed
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use log::logger::AdvancedLogger;
/// use log::{set_logger, LogLevel};
///
/// let logger = Arc::new(AdvancedLogger::new(LogLevel::Debug, None));
/// set_logger(logger).expect("Failed to initialize logger");
/// ```
pub fn set_logger(logger: Arc<dyn Logger + Send + Sync>) -> Result<(), LogError> {
    LOGGER
        .set(logger)
        .map_err(|_| LogError::AlreadyInitialized)
}

/// Retrieves the current global logger, if one is set
pub fn logger() -> Option<Arc<dyn Logger + Send + Sync>> {
    LOGGER.get().cloned()
}

/// Errors that can occur during logger operations
#[derive(Debug)]
pub enum LogError {
    /// Returned when attempting to install a logger after one has already been set
    AlreadyInitialized,
    /// Returned when attempting to use a logger before one has been set
    NoLogger,
}

impl Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogError::AlreadyInitialized => write!(f, "Logger has already been initialized"),
            LogError::NoLogger => write!(f, "No logger set"),
        }
    }
}

impl std::error::Error for LogError {}

/// Trait that all logger implementations must implement
pub trait Logger: Send + Sync {
    /// Logs a message at INFO level
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    /// Logs a message at WARNING level
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }
    /// Logs a message at ERROR level
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
    /// Logs a message at CRITICAL level
    fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }
    /// Logs a message at DEBUG level
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    /// Logs a message with a specified log level
    fn log(&self, level: LogLevel, message: &str);
    /// Sets the minimum logging level that will be output
    fn set_level(&self, level: LogLevel);
}

/// Logging levels. `NoLog` as a threshold suppresses everything.
///
/// The default level is Info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Special level that suppresses all logging
    NoLog,
    /// Debug information for development purposes
    Debug,
    #[default]
    /// Standard informational messages
    Info,
    /// Warning messages indicating potential issues
    Warning,
    /// Error messages for recoverable failures
    Error,
    /// Critical messages for severe errors that might cause program termination
    Critical,
}

impl LogLevel {
    /// Returns the plain string representation of the log level
    pub fn raw_str(&self) -> &'static str {
        match self {
            LogLevel::NoLog => "NOLOG",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub(crate) fn severity(&self) -> u8 {
        match self {
            LogLevel::NoLog => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warning => 3,
            LogLevel::Error => 4,
            LogLevel::Critical => 5,
        }
    }

    pub(crate) fn from_severity(value: u8) -> Self {
        match value {
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Critical,
            _ => LogLevel::NoLog,
        }
    }

    /// Whether a message at `level` passes when `self` is the threshold
    pub fn allows(&self, level: LogLevel) -> bool {
        *self != LogLevel::NoLog
            && level != LogLevel::NoLog
            && level.severity() >= self.severity()
    }

    /// Parses a level name such as `"debug"` or `"WARNING"`
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nolog" | "off" => Some(LogLevel::NoLog),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    /// Provides colored text formatting for each log level
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use LogLevel::*;
        let level_str = match self {
            NoLog => String::new(),
            Info => format!("{}", "INFO".blue().bold()),
            Warning => format!("{}", "WARNING".yellow().bold()),
            Error => format!("{}", "ERROR".red().bold()),
            Critical => format!("{}", "CRITICAL".bright_red().bold()),
            Debug => format!("{}", "DEBUG".cyan().bold()),
        };
        write!(f, "{level_str}")
    }
}

/// Logs a message with the specified log level
///
/// # Example
///
/// ```
/// use log::{log, LogLevel};
///
/// log!(LogLevel::Warning, "This is a {} message", "warning");
/// ```
#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {{
        if let Some(logger) = $crate::logger() {
            let message = format!($($arg)*);
            logger.log($level, &message);
        }
    }};
}

/// Logs a message at INFO level
///
/// # Example
///
/// ```
/// use log::info;
///
/// info!("Listening on {}", "0.0.0.0:3000");
/// ```
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        $crate::log!($crate::LogLevel::Info, $($arg)*);
    }};
}

/// Logs a message at WARNING level
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {{
        $crate::log!($crate::LogLevel::Warning, $($arg)*);
    }};
}

/// Logs a message at ERROR level
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::log!($crate::LogLevel::Error, $($arg)*);
    }};
}

/// Logs a message at CRITICAL level
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {{
        $crate::log!($crate::LogLevel::Critical, $($arg)*);
    }};
}

/// Logs a message at DEBUG level
///
/// # Example
///
/// ```
/// use log::debug;
///
/// debug!("Frame #{} took {}ms", 12, 33);
/// ```
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        $crate::log!($crate::LogLevel::Debug, $($arg)*);
    }};
}
