//! Logging infrastructure - structured tracing for bridge events
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Console or file output (file output goes through a non-blocking appender)

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn, Level};


/// Global logging state. Holds the appender guard when logging to a file.
static LOGGER_INITIALIZED: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // MIRROR_BRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("MIRROR_BRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // MIRROR_BRIDGE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("MIRROR_BRIDGE_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("MIRROR_BRIDGE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("MIRROR_BRIDGE_LOG_SPANS").is_ok();

        config
    }

    /// Minimal logging for hot embeddings
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Verbose logging to `mirror_bridge.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("mirror_bridge.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

/// Parse a level name as accepted in configuration and environment
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (first call wins)
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "mirror_bridge={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = match config.log_path.as_deref().filter(|_| config.file_output) {
            Some(path) => {
                let path = Path::new(path);
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "mirror_bridge.log".to_string());
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (w, g) = tracing_appender::non_blocking(appender);
                (w, Some(g))
            }
            None => {
                let (w, g) = tracing_appender::non_blocking(io::stderr());
                (w, Some(g))
            }
        };

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        // Host may already own a global subscriber
        let _ = tracing_subscriber::registry()
            .with(layer.with_filter(env_filter))
            .try_init();

        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific events
// ============================================================================

/// Log runtime registration
pub fn log_runtime_set(runtime: u64) {
    info!(
        event = "runtime_set",
        runtime,
        "Managed runtime registered"
    );
}

/// Log a thread attaching to the runtime
pub fn log_thread_attached(cache: u64) {
    debug!(
        event = "thread_attached",
        cache,
        thread = ?std::thread::current().id(),
        "Thread attached to managed runtime"
    );
}

/// Log mirror materialization from the native side
pub fn log_mirror_created(native: u64, class: &str, mirror: u64) {
    debug!(
        event = "mirror_created",
        native,
        class,
        mirror,
        "Mirror created"
    );
}

/// Log a mirror supplied from outside
pub fn log_mirror_attached(native: u64, mirror: Option<u64>, native_responsible: bool) {
    debug!(
        event = "mirror_attached",
        native,
        mirror = ?mirror,
        native_responsible,
        "Mirror attached"
    );
}

/// Log reference acquisition
#[inline]
pub fn log_reference_acquired(object: u64, strong: bool) {
    trace!(event = "reference_acquired", object, strong, "Reference acquired");
}

/// Log reference release
#[inline]
pub fn log_reference_released(object: u64, strong: bool) {
    trace!(event = "reference_released", object, strong, "Reference released");
}

/// Log native destruction requested by the managed side
pub fn log_native_destroyed(native: u64) {
    debug!(
        event = "native_destroyed",
        native,
        "Native object destroyed on managed request"
    );
}

/// Log a managed heap collection
pub fn log_collection(collected: usize, finalized: usize, live: usize) {
    debug!(
        event = "collection",
        objects_collected = collected,
        natives_finalized = finalized,
        live_objects = live,
        "Managed heap collection complete"
    );
}
