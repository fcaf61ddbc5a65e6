//! Per-run session directories and their JSON records.

use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use crate::foundation::error::InklayerResult;

pub const SESSION_RECORD: &str = "session.json";
pub const MANIFEST_RECORD: &str = "manifest.json";

const SESSION_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn session_dir_name(at: DateTime<Utc>) -> String {
    at.format(SESSION_DIR_FORMAT).to_string()
}

/// Create `<base>/<YYYYmmdd_HHMMSS>` for a run started at `at`.
pub fn create_session_dir(base: &Path, at: DateTime<Utc>) -> InklayerResult<PathBuf> {
    let dir = base.join(session_dir_name(at));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create session dir '{}'", dir.display()))?;
    Ok(dir)
}

/// Pretty-print `value` to `path` with a trailing newline.
pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> InklayerResult<()> {
    let f = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.write_all(b"\n")
        .and_then(|()| w.flush())
        .with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/session.rs"]
mod tests;
