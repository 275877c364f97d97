// Logging for btpool
//
// Built on the `tracing` ecosystem. The pool and its workers emit structured
// events through the macros exported here; applications decide where those
// events go by installing a subscriber once at startup.
//
// # Usage Examples
//
// ```rust,ignore
// use btpool::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or a custom configuration
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Worker threads inherit the dispatcher that was current on the thread that
// spawned them, so scoped subscribers installed with
// `tracing::subscriber::set_default` also capture worker events.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter, fmt, prelude::*, registry::Registry};

/// Configuration for the logging system
///
/// ```rust
/// use btpool::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("btpool::pool=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(!config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id (worker threads are named `<pool>-<id>`)
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Installs the global subscriber. Only the first call in a process takes
/// effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let console = console_layer(&config);
        let subscriber = tracing_subscriber::registry()
            .with(vec![console])
            .with(env_filter(&config));
        set_global_subscriber(subscriber);
    });
}

/// Initialize logging with both console and file output
///
/// The file is opened in append mode and created if missing. File output is
/// always plain text with file, line and thread information.
///
/// # Errors
/// Returns an error if the file cannot be opened or created
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    let file = open_log_file(log_file.as_ref())?;

    INIT.call_once(|| {
        let file_config = LogConfig {
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            ..config.clone()
        };
        let layers = vec![
            console_layer(&config),
            build_layer(&file_config, false, Mutex::new(file)),
        ];
        let subscriber = tracing_subscriber::registry()
            .with(layers)
            .with(env_filter(&config));
        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG level with TRACE for the pool internals, colored output with
/// file/line information
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("btpool=debug,btpool::pool=trace".to_string()),
    });
}

/// INFO level JSON output without file/line information
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact output for tests
///
/// ```rust
/// btpool::logging::init_test();
/// btpool::logging::init_test(); // later calls are no-ops
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(config.level).into());

    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',').filter(|d| !d.trim().is_empty()) {
            match directive.trim().parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring invalid log filter '{}': {}", directive, err),
            }
        }
    }

    filter
}

fn console_layer(config: &LogConfig) -> BoxedLayer {
    build_layer(config, atty::is(atty::Stream::Stdout), io::stdout)
}

fn build_layer<W>(config: &LogConfig, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    match (config.json_format, config.show_time) {
        (true, true) => Box::new(layer.json().flatten_event(true)),
        (true, false) => Box::new(layer.json().flatten_event(true).without_time()),
        (false, true) => Box::new(layer),
        (false, false) => Box::new(layer.without_time()),
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Span covering the operations of one pool
///
/// ```rust
/// let span = btpool::pool_span!("btpool0");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool:expr) => {
        $crate::logging::info_span!("pool", name = %$pool)
    };
    ($pool:expr, $($fields:tt)*) => {
        $crate::logging::info_span!("pool", name = %$pool, $($fields)*)
    };
}

/// Span entered by a worker thread for its whole lifetime
#[macro_export]
macro_rules! worker_span {
    ($worker:expr) => {
        $crate::logging::debug_span!("worker", name = %$worker)
    };
    ($worker:expr, $($fields:tt)*) => {
        $crate::logging::debug_span!("worker", name = %$worker, $($fields)*)
    };
}

/// Log a lifecycle transition of a component
///
/// ```rust
/// use btpool::log_lifecycle;
/// use btpool::LifecycleState;
///
/// log_lifecycle!("btpool0", LifecycleState::Stopped, LifecycleState::Starting);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($component:expr, $from:expr, $to:expr) => {
        $crate::logging::info!(component = %$component, from = %$from, to = %$to, "lifecycle transition");
    };
    ($component:expr, $from:expr, $to:expr, $($fields:tt)*) => {
        $crate::logging::info!(component = %$component, from = %$from, to = %$to, $($fields)*);
    };
}

/// Log how a job was admitted (`idle`, `spawn` or `backlog`) or rejected
#[macro_export]
macro_rules! log_dispatch {
    ($pool:expr, $route:expr) => {
        $crate::logging::trace!(pool = %$pool, route = $route, "dispatch");
    };
    ($pool:expr, $route:expr, $($fields:tt)*) => {
        $crate::logging::trace!(pool = %$pool, route = $route, $($fields)*);
    };
}

/// Log worker events (started, parked, retired, ...)
#[macro_export]
macro_rules! log_worker {
    ($worker:expr, $event:expr) => {
        $crate::logging::debug!(worker = %$worker, event = $event);
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        $crate::logging::debug!(worker = %$worker, event = $event, $($fields)*);
    };
}

/// Log error events
///
/// ```rust
/// use btpool::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "spawn failed");
/// log_error!(error);
/// log_error!(error, pool = "btpool0");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        $crate::logging::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        $crate::logging::error!(error = %$error, $($fields)*);
    };
}

/// Get the current tracing dispatcher
///
/// Captured before spawning a worker thread and installed as that thread's
/// default, so workers log wherever their pool's owner logs.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the tracing macros used by the exported macros above
pub use tracing::{debug, debug_span, error, info, info_span, trace, warn};
