use std::fs;
use std::path::Path;

use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";

/// Console output plus a daily-rotated JSON file under `logs/`. Without a
/// writable log directory only the console layer is installed.
pub fn init_logging() {
    init_logging_in(Path::new(LOG_DIR));
}

fn init_logging_in(dir: &Path) {
    let dir_error = fs::create_dir_all(dir).err();

    let (file_layer, guard) = if dir_error.is_none() {
        let file_appender = tracing_appender::rolling::daily(dir, "etl.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        (Some(fmt::layer().json().with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("county_health_etl=info"));

    // try_init so tests and embedders that already installed a subscriber keep theirs
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    if let Some(e) = dir_error {
        warn!(dir = %dir.display(), error = %e, "cannot create log directory, logging to console only");
    }

    // Keep the guard alive for the whole process so buffered lines are flushed
    std::mem::forget(guard);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritable_log_directory_falls_back_to_console() {
        let tmp = tempfile::tempdir().unwrap();
        let blocked = tmp.path().join("not-a-dir");
        fs::write(&blocked, "").unwrap();

        init_logging_in(&blocked.join("logs"));
        assert!(blocked.is_file());
        assert!(!blocked.join("logs").exists());
    }
}
