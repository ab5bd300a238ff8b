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

//! Serial device discovery and hot-plug polling

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{RadmonError, Result};
use crate::logger;

/// Platform-level name of a serial endpoint (`/dev/ttyUSB0`, `COM3`, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDiff {
    pub added: BTreeSet<DeviceId>,
    pub removed: BTreeSet<DeviceId>,
}

impl DeviceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Source of the currently attached serial devices
#[cfg_attr(test, mockall::automock)]
pub trait DeviceEnumerator: Send {
    fn available(&self) -> Result<BTreeSet<DeviceId>>;
}

/// Enumerates ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialEnumerator;

impl DeviceEnumerator for SerialEnumerator {
    fn available(&self) -> Result<BTreeSet<DeviceId>> {
        let ports = serialport::available_ports()
            .map_err(|e| RadmonError::EnumerationUnsupported(e.description))?;
        Ok(ports.into_iter().map(|p| DeviceId::new(p.port_name)).collect())
    }
}

/// Query the enumerator, degrading to an empty set when enumeration is unavailable.
pub fn list_devices(enumerator: &dyn DeviceEnumerator) -> BTreeSet<DeviceId> {
    match enumerator.available() {
        Ok(set) => set,
        Err(e) => {
            report_enumeration_failure(&e, true);
            BTreeSet::new()
        }
    }
}

fn report_enumeration_failure(e: &RadmonError, first: bool) {
    if first {
        warn!("Device enumeration failed: {}", e);
        logger::log_event("enumeration_failed", json!({ "error": e.to_string() }));
    } else {
        debug!("Device enumeration still failing: {}", e);
    }
}

pub fn poll_for_changes(previous: &BTreeSet<DeviceId>, current: &BTreeSet<DeviceId>) -> DeviceDiff {
    DeviceDiff {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

/// Tracks the last known device list and re-queries it on a fixed interval.
pub struct DevicePoller {
    enumerator: Box<dyn DeviceEnumerator>,
    known: BTreeSet<DeviceId>,
    interval: Duration,
    last_poll: Instant,
    failing: bool,
}

impl DevicePoller {
    pub fn new(enumerator: Box<dyn DeviceEnumerator>, interval: Duration) -> Self {
        let (known, failing) = match enumerator.available() {
            Ok(set) => (set, false),
            Err(e) => {
                report_enumeration_failure(&e, true);
                (BTreeSet::new(), true)
            }
        };
        info!("Found {} serial device(s)", known.len());
        Self {
            enumerator,
            known,
            interval,
            last_poll: Instant::now(),
            failing,
        }
    }

    pub fn known(&self) -> &BTreeSet<DeviceId> {
        &self.known
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.duration_since(self.last_poll) >= self.interval
    }

    /// Time left until the next poll is due
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(now.duration_since(self.last_poll))
    }

    /// Re-query and diff against the last known list.
    ///
    /// A failed query leaves the known list as it was and reports no change.
    pub fn poll(&mut self, now: Instant) -> DeviceDiff {
        self.last_poll = now;
        let current = match self.enumerator.available() {
            Ok(set) => {
                if self.failing {
                    info!("Device enumeration recovered");
                    self.failing = false;
                }
                set
            }
            Err(e) => {
                report_enumeration_failure(&e, !self.failing);
                self.failing = true;
                return DeviceDiff::default();
            }
        };
        let diff = poll_for_changes(&self.known, &current);
        if !diff.is_empty() {
            debug!("Device list changed: +{} -{}", diff.added.len(), diff.removed.len());
        }
        self.known = current;
        diff
    }
}
