use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Default filter for `-d` repetitions when RUST_LOG is unset
pub fn default_filter(debug: u8) -> &'static str {
    match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging.
///
/// - `debug`: number of `-d` flags given
/// - `log_file`: if set, also log to this file
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(debug: u8, log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    match log_file {
        Some(log_path) => {
            if let Some(log_dir) = log_path.parent() {
                fs::create_dir_all(log_dir)?;
            }

            // Truncate if over 1MB
            truncate_if_needed(log_path)?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;

            let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_file)
                        .with_ansi(false)
                        .with_target(true),
                )
                .init();

            tracing::info!("Logging to file: {}", log_path.display());

            Ok(Some(guard))
        }
        None => {
            // Console-only logging
            tracing_subscriber::fmt().with_env_filter(env_filter).init();

            Ok(None)
        }
    }
}

/// Truncate log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() {
        let metadata = fs::metadata(log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            let file = File::create(log_path)?;
            file.set_len(0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(0), "info");
        assert_eq!(default_filter(1), "debug");
        assert_eq!(default_filter(4), "trace");
    }

    #[test]
    fn test_large_log_is_truncated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hearth.log");

        fs::write(&path, vec![b'x'; 16]).unwrap();
        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 16);

        fs::write(&path, vec![b'x'; (MAX_LOG_SIZE + 1) as usize]).unwrap();
        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
