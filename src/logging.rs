use std::fs::{self, OpenOptions};
use std::path::PathBuf;

const DEFAULT_FILTER: &str = "taha_tui=info";

pub fn log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taha-tui")
        .join("taha-tui.log")
}

/// Sends `log` records to a file so they never land on the terminal the UI
/// is drawing on. `RUST_LOG` overrides the default filter. Returns the log
/// file path, or `None` when logging could not be set up.
pub fn init() -> Option<PathBuf> {
    let path = log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .ok()?;

    Some(path)
}
