use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Result, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use sha2::{Digest, Sha256};

pub const LOG_FILE: &str = "logs.txt";

/// Cache dir of the last `init_cache`; log lines go there.
static ACTIVE_CACHE_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Serializes tests that switch the active cache dir.
#[cfg(test)]
pub(crate) static CACHE_DIR_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Returns the path to the cache directory. Uses REVCHAIN_CACHE_DIR if set;
/// otherwise the platform cache dir (e.g. ~/.cache/revchain), falling back to $HOME/.revchain-cache.
pub fn get_cache_dir() -> PathBuf {
    if let Ok(dir) = env::var("REVCHAIN_CACHE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(dir) = dirs::cache_dir() {
        return dir.join("revchain");
    }
    let base = if cfg!(target_os = "windows") {
        env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string())
    } else {
        env::var("HOME").unwrap_or_else(|_| ".".to_string())
    };
    PathBuf::from(base).join(".revchain-cache")
}

/// Cache dir in use: the one passed to `init_cache`, else `get_cache_dir()`.
pub fn active_cache_dir() -> PathBuf {
    ACTIVE_CACHE_DIR
        .read()
        .ok()
        .and_then(|dir| dir.clone())
        .unwrap_or_else(get_cache_dir)
}

pub fn init_cache(cache_dir: &Path) -> Result<()> {
    fs::create_dir_all(cache_dir)?;

    let log_path = cache_dir.join(LOG_FILE);
    if !log_path.exists() {
        File::create(&log_path)?;
    }

    if let Ok(mut active) = ACTIVE_CACHE_DIR.write() {
        *active = Some(cache_dir.to_path_buf());
    }
    Ok(())
}

fn log_level() -> String {
    env::var("REVCHAIN_LOG").map(|v| v.to_lowercase()).unwrap_or_default()
}

fn is_quiet() -> bool {
    if env::var("REVCHAIN_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    matches!(log_level().as_str(), "quiet" | "error")
}

pub fn debug_enabled() -> bool {
    log_level() == "debug"
}

fn write_line(message: &str, to_stdout: bool) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let log_message = format!("[{}] {}", timestamp, message);

    if to_stdout {
        println!("{}", log_message);
    }

    // Append-only; the file is only written once the cache dir has been initialised.
    let log_path = active_cache_dir().join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new().append(true).open(&log_path) {
        let _ = writeln!(file, "{}", log_message);
    }
}

pub fn log(message: &str) {
    write_line(message, !is_quiet());
}

/// Only emitted with REVCHAIN_LOG=debug. Used by the resolver chain for per-step tracing.
pub fn log_debug(message: &str) {
    if debug_enabled() {
        write_line(&format!("DEBUG {}", message), true);
    }
}

pub fn log_error(message: &str) {
    eprintln!("{}", message);
    write_line(message, false);
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Make a string safe to use as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
