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

//! Severity mapping
//!
//! Pure conversion of a raw instrument reading into a percentage of the
//! configured scale, and of that percentage into a display color on a
//! green -> yellow -> red ramp. No state, no side effects.

use serde::{Deserialize, Serialize};

/// Color shown while no valid reading is available
pub const NO_DATA_COLOR: Rgb = Rgb { r: 100, g: 100, b: 100 };

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb` form for frontends that take CSS-style colors
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// How `normalize` treats ratios outside `[0, 100]`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampPolicy {
    /// Keep the rounded percentage as computed; `color_for` handles the range
    #[default]
    None,
    /// Clamp the stored percentage into `[0, 100]`
    Saturate,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub percentage: f64,
    /// True when the unclamped ratio fell outside `[0, 100]`
    pub clamped_from_raw: bool,
}

/// Round to two decimals, ties to even
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

pub fn normalize(raw: f64, max: f64) -> NormalizedSample {
    normalize_with(raw, max, ClampPolicy::None)
}

pub fn normalize_with(raw: f64, max: f64, policy: ClampPolicy) -> NormalizedSample {
    let percentage = round2(raw / max * 100.0);
    let out_of_range = !(0.0..=100.0).contains(&percentage);
    let percentage = match policy {
        ClampPolicy::Saturate if out_of_range && percentage < 0.0 => 0.0,
        ClampPolicy::Saturate if out_of_range => 100.0,
        _ => percentage,
    };
    NormalizedSample {
        percentage,
        clamped_from_raw: out_of_range,
    }
}

/// Map a percentage onto the severity ramp.
///
/// Anything outside `[0, 100]` (negative, above 100, NaN) is treated as 100.
pub fn color_for(percentage: f64) -> Rgb {
    let p = if (0.0..=100.0).contains(&percentage) { percentage } else { 100.0 };

    let r = if p > 50.0 { 255 } else { (255.0 * p / 50.0) as u8 };
    let g = if p <= 50.0 { 255 } else { (255.0 * (100.0 - p) / 50.0) as u8 };

    Rgb::new(r, g, 0)
}
