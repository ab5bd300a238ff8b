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

//! Line decoding for the instrument feed.
//!
//! The device sends one ASCII decimal number per line. Parsing is
//! locale-invariant: `.` is the only decimal separator, no grouping.

use serde::{Deserialize, Serialize};

use crate::error::{RadmonError, Result};

/// One decoded numeric sample from the device
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub raw_value: f64,
}

/// Parse one line into a Reading.
///
/// On failure the error carries the trimmed line as received.
pub fn parse_line(line: &str) -> Result<Reading> {
    let data = line.trim();
    match data.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Reading { raw_value: v }),
        _ => Err(RadmonError::ParseFailure(data.to_string())),
    }
}
