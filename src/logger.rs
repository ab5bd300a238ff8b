/*
 * This file is part of Radmon.
 *
 * Copyright (C) 2025 Radmon contributors
 *
 * Radmon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Radmon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Radmon. If not, see <https://www.gnu.org/licenses/>.
 */

//! Optional JSON-lines event journal.
//!
//! Nothing is written until `init_logging` has been called; `log_event`
//! is a no-op before that, so library code can journal unconditionally.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

pub const DEFAULT_LOG_PATH: &str = "/var/log/radmon/events.json";
const FALLBACK_LOG_PATH: &str = "/tmp/radmon_events.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<(PathBuf, File)>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Open the journal at `path`, falling back to /tmp. Returns the path in use.
pub fn init_logging_at(path: &Path) -> Option<PathBuf> {
    let (used, file) = match open_append(path) {
        Some(f) => (path.to_path_buf(), f),
        None => {
            let fallback = PathBuf::from(FALLBACK_LOG_PATH);
            let f = open_append(&fallback)?;
            (fallback, f)
        }
    };
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some((used.clone(), file));
    }
    Some(used)
}

pub fn init_logging() -> Option<PathBuf> {
    init_logging_at(Path::new(DEFAULT_LOG_PATH))
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

pub fn log_event(event: &str, data: Value) {
    let Ok(mut guard) = LOG_FILE.lock() else { return };
    let Some((_, f)) = guard.as_mut() else { return };
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();
    let _ = writeln!(f, "{}", line);
}

#[cfg(test)]
pub(crate) fn shutdown_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}
