//! Line-oriented logging with timestamps, source locations and ANSI colour.
//!
//! Provides the [`rlog!`] macro. Every line has the form:
//!
//! ```text
//! 20261019T09:14:03.512 - src/cache/mod.rs:88 - cache: forgot group ABC123
//! ```
//!
//! Output goes to stderr unless [`set_writer`] installs another destination.
//! Admin and access codes are secrets: format them with [`secret`] so that
//! only a short prefix ever reaches a log.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::SystemTime;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_WRITER: LazyLock<Mutex<Box<dyn Write + Send>>> =
    LazyLock::new(|| Mutex::new(Box::new(io::stderr())));

/// Detect whether stderr is a terminal and enable colour accordingly.
pub fn init() {
    COLOUR_ENABLED.store(io::stderr().is_terminal(), Ordering::Relaxed);
}

/// Send all subsequent [`rlog!`] output to `w`. Disables colour.
pub fn set_writer(w: Box<dyn Write + Send>) {
    COLOUR_ENABLED.store(false, Ordering::Relaxed);
    *LOG_WRITER.lock().unwrap_or_else(PoisonError::into_inner) = w;
}

pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

const CODE_COLOURS: &[&str] = &[
    "\x1b[91m", // bright red
    "\x1b[92m", // bright green
    "\x1b[93m", // bright yellow
    "\x1b[94m", // bright blue
    "\x1b[95m", // bright magenta
    "\x1b[96m", // bright cyan
];

fn hash_colour(code: &str) -> &'static str {
    let hash: u32 = code
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    CODE_COLOURS[(hash as usize) % CODE_COLOURS.len()]
}

/// Format a join code, coloured consistently per code on a terminal.
pub fn join_code(code: &str) -> String {
    if colour_enabled() {
        format!("{}{code}{RESET}", hash_colour(code))
    } else {
        code.to_string()
    }
}

const SECRET_VISIBLE_CHARS: usize = 2;

/// Redact a secret code down to its first two characters.
///
/// `secret("K7PQ2Z")` gives `K7****`; codes of two characters or fewer are
/// fully masked.
pub fn secret(code: &str) -> String {
    let total = code.chars().count();
    if total <= SECRET_VISIBLE_CHARS {
        return "*".repeat(total.max(1));
    }
    let visible: String = code.chars().take(SECRET_VISIBLE_CHARS).collect();
    format!("{visible}{}", "*".repeat(total - SECRET_VISIBLE_CHARS))
}

/// Format the current wall-clock time as `YYYYMMDDTHH:MM:SS.mmm` (UTC).
pub fn format_timestamp() -> String {
    let duration = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    // Civil date from days since epoch (Howard Hinnant's algorithm).
    let days = (secs / 86400) as i64;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}{:02}{:02}T{:02}:{:02}:{:02}.{:03}",
        y, m, d, hours, minutes, seconds, millis
    )
}

/// Write one log line. Called by [`rlog!`].
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    let formatted = if colour_enabled() {
        format!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    let mut writer = LOG_WRITER.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = writeln!(*writer, "{formatted}");
}

/// Emit a log line with timestamp and source location.
///
/// ```ignore
/// rlog!("cache: remembered admin code for {}", logging::join_code(&code));
/// ```
#[macro_export]
macro_rules! rlog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
