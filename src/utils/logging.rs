use chrono::{Local, Utc};
use env_logger::{Builder, Env};
use log::{debug, error, info};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;

static INIT: Once = Once::new();

/// Keep only this many session logs
const MAX_LOG_FILES: usize = 10;

/// Initialize the logging system
pub fn init_logger() {
    INIT.call_once(|| {
        let log_dir = get_log_dir();
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create log directory: {}", e);
        }

        let log_file = get_log_file_path(&log_dir);
        let env = Env::default().filter_or("LOG_LEVEL", "info");

        let mut builder = Builder::from_env(env);
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

        match OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(file) => {
                builder
                    .target(env_logger::Target::Pipe(Box::new(FileAndStdout { file })))
                    .init();

                info!("Logging initialized: {}", log_file.display());
                debug!("Log level: {}", get_log_level());
                info!("Keystroke biometrics starting at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
            }
            Err(e) => {
                // Fall back to stdout only
                builder.init();
                error!("Failed to open log file, logging to stdout only: {}", e);
            }
        }

        if let Err(e) = clean_old_logs(&log_dir) {
            error!("Failed to clean old logs: {}", e);
        }
    });
}

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    if let Ok(dir) = env::var("LOG_DIR") {
        return PathBuf::from(dir);
    }

    match home::home_dir() {
        Some(path) => path.join(".keystroke_biometrics").join("logs"),
        None => {
            eprintln!("Could not determine home directory for logs");
            PathBuf::from("logs")
        }
    }
}

/// Get the log file path for the current session
fn get_log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    log_dir.join(format!("biometrics_{}.log", timestamp))
}

fn get_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Clean up old log files, newest first by modification time
fn clean_old_logs(log_dir: &Path) -> std::io::Result<()> {
    let mut log_files = Vec::new();

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "log") {
            let modified = fs::metadata(&path)?.modified()?;
            log_files.push((modified, path));
        }
    }

    log_files.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, file) in log_files.iter().skip(MAX_LOG_FILES) {
        debug!("Removing old log file: {}", file.display());
        fs::remove_file(file)?;
    }

    Ok(())
}

/// Custom writer that writes to both a file and stdout
struct FileAndStdout {
    file: File,
}

impl Write for FileAndStdout {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_old_logs_keeps_latest() {
        let dir = env::temp_dir().join(format!("biometrics-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..(MAX_LOG_FILES + 3) {
            File::create(dir.join(format!("biometrics_{:02}.log", i))).unwrap();
        }
        File::create(dir.join("notes.txt")).unwrap();

        clean_old_logs(&dir).unwrap();

        let logs = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "log"))
            .count();
        assert_eq!(logs, MAX_LOG_FILES);
        assert!(dir.join("notes.txt").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_log_file_name() {
        let path = get_log_file_path(Path::new("/var/log/biometrics"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("biometrics_"));
        assert!(name.ends_with(".log"));
    }
}
