//! Logging setup
//!
//! Console output by default; a daily rolling file when `log_dir` points at
//! an existing directory.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber
///
/// `level` is an `EnvFilter` directive (`info`, `print_worker=debug,info`).
/// An unparseable directive falls back to `info`.
pub fn init_logger(level: &str, log_dir: Option<&str>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.is_dir() {
            let file_appender = tracing_appender::rolling::daily(log_path, "print-worker");
            subscriber.with_ansi(false).with_writer(file_appender).init();
            return;
        }
    }

    subscriber.init();
}
