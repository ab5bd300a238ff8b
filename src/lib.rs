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

//! Radmon - radiation level monitor for line-oriented serial devices
//!
//! This library provides serial device discovery, a single-link port
//! session, the raw value to severity color mapping, and the monitor loop
//! that ties them together.

pub mod error;
pub mod config;
pub mod logger;
pub mod ports;
pub mod transport;
pub mod reading;
pub mod severity;
pub mod session;
pub mod display;
pub mod monitor;

#[cfg(test)]
pub mod test_utils;
