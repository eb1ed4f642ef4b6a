use tracing::{debug, level_filters::LevelFilter, subscriber::DefaultGuard, Subscriber};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} - {}", now.format("%d %B"), now.format("%H:%M:%S%.6f"))
    }
}

fn build_subscriber(log_level: LevelFilter) -> impl Subscriber + Send + Sync {
    // RUST_LOG directives still apply, `log_level` is added on top
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let format = Format::default().with_timer(LocalTimer).with_level(true).with_target(false);

    tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish()
}

/// Installs the global subscriber. Safe to call more than once, later calls are ignored.
pub fn setup_logger(log_level: LevelFilter) {
    if tracing::subscriber::set_global_default(build_subscriber(log_level)).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}

/// Installs a subscriber for the current thread until the guard is dropped.
pub fn setup_scoped_logger(log_level: LevelFilter) -> DefaultGuard {
    tracing::subscriber::set_default(build_subscriber(log_level))
}
