//! Destination key scheme.
//!
//! With structure preserved a file lands at `<prefix>/<relative path>`;
//! flattened, it lands at `<prefix>/<timestamp>_<file name>` where the
//! timestamp is in milliseconds and never repeats within a process.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use shoebox_inventory::FileEntry;
use shoebox_storage::join_key;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

/// Millisecond clock that never returns the same value twice.
///
/// Two files flattened within the same millisecond would otherwise collide
/// when they share a name.
#[derive(Debug, Default)]
pub struct KeyClock {
    last: AtomicI64,
}

impl KeyClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current Unix time in milliseconds, bumped past the previous value if
    /// needed.
    pub fn next(&self) -> i64 {
        let now = i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX);
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self.last.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Where `file` is uploaded to.
pub fn destination_key(prefix: &str, file: &FileEntry, preserve_structure: bool, clock: &KeyClock) -> Result<String> {
    let relative = match preserve_structure {
        true => file.relative_path.clone(),
        false => format!("{}_{}", clock.next(), file.name),
    };
    join_key(prefix, &relative).or_raise(|| ErrorKind::InvalidKey(relative.clone()))
}

/// The key a file would have if its structure were preserved, used to
/// compare against remote listings.
pub fn remote_key(prefix: &str, relative_path: &str) -> String {
    match prefix.trim_end_matches('/') {
        "" => relative_path.to_string(),
        prefix => format!("{prefix}/{relative_path}"),
    }
}
