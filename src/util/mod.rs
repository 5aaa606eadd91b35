//! Utility module
//!
//! Frame hex dumps for the `dump` flag and logging setup.

use std::fmt::Write;

use tracing::Level;

const DUMP_ROW: usize = 16;

/// Formats `bytes` as rows of 16 hex octets prefixed by their offset
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / DUMP_ROW * 7);
    for (row, chunk) in bytes.chunks(DUMP_ROW).enumerate() {
        if row > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x}:", row * DUMP_ROW);
        for byte in chunk {
            let _ = write!(out, " {:02x}", byte);
        }
    }
    out
}

/// Installs a fmt subscriber at `level`
///
/// Returns false if a global subscriber was already set.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
