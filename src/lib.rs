pub mod sim;

pub use sim::{SimulationCore, SimulationCoreBuilder};

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally logs a message every 100 ticks when the `perf_stats`
/// feature is enabled.
///
/// # Zero-Cost Abstraction
/// When compiled without `perf_stats`, this expands to nothing — not even
/// the arguments are evaluated.
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {
        if $tick % 100 == 0 {
            tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($tick:expr, $($arg:tt)*) => {};
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Installs a `tracing-subscriber` `fmt` layer with an `EnvFilter` driven by
/// `RUST_LOG` (defaulting to `info`). The library never calls this itself —
/// only a binary or test harness that owns the process should install a
/// global subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Installs a rolling daily file appender alongside the usual `fmt` layer,
/// for long-running simulation processes that want diagnostics persisted to
/// disk (teacher pattern: `tracing_appender::rolling`). Requires the
/// `diagnostics-log` feature; returns the worker guard the caller must hold
/// for the lifetime of the process, or logging stops when it drops.
#[cfg(feature = "diagnostics-log")]
pub fn init_tracing_with_file_log(directory: &str, file_name_prefix: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::EnvFilter;

    let file_appender = tracing_appender::rolling::daily(directory, file_name_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .try_init();

    guard
}
