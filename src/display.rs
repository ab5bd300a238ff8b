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

//! Presentation-neutral display model.
//!
//! Holds what a front end would show: the live value and its severity
//! color, or the "no data" placeholder, plus one transient notice.

use std::time::{Duration, Instant};

use crate::ports::DeviceId;
use crate::reading::Reading;
use crate::session::SessionEvent;
use crate::severity::{color_for, NormalizedSample, Rgb, NO_DATA_COLOR};

pub const NO_DATA_TEXT: &str = "?";
pub const DOSE_RATE_UNIT: &str = "nSv/h";

pub fn format_dose_rate(raw: f64) -> String {
    format!("{:.2} {}", raw, DOSE_RATE_UNIT)
}

pub fn format_percentage(percentage: f64) -> String {
    format!("{:.2}%", percentage)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DisplayState {
    #[default]
    NoData,
    Live {
        reading: Reading,
        sample: NormalizedSample,
        color: Rgb,
    },
}

impl DisplayState {
    pub fn live(reading: Reading, sample: NormalizedSample) -> Self {
        DisplayState::Live {
            reading,
            sample,
            color: color_for(sample.percentage),
        }
    }

    /// Fold one session event into the display. Returns true if it changed.
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        let next = match event {
            SessionEvent::Reading { reading, sample } => DisplayState::live(*reading, *sample),
            SessionEvent::ParseFailure(_)
            | SessionEvent::TransportError { .. }
            | SessionEvent::OpenFailed { .. }
            | SessionEvent::Disconnected(_) => DisplayState::NoData,
            SessionEvent::Connected(_) => return false,
        };
        let changed = next != *self;
        *self = next;
        changed
    }

    pub fn is_live(&self) -> bool {
        matches!(self, DisplayState::Live { .. })
    }

    pub fn color(&self) -> Rgb {
        match self {
            DisplayState::NoData => NO_DATA_COLOR,
            DisplayState::Live { color, .. } => *color,
        }
    }

    pub fn dose_rate_text(&self) -> String {
        match self {
            DisplayState::NoData => format!("{} {}", NO_DATA_TEXT, DOSE_RATE_UNIT),
            DisplayState::Live { reading, .. } => format_dose_rate(reading.raw_value),
        }
    }

    pub fn percentage_text(&self) -> String {
        match self {
            DisplayState::NoData => NO_DATA_TEXT.to_string(),
            DisplayState::Live { sample, .. } => format_percentage(sample.percentage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
    pub expires_at: Instant,
}

/// Single-slot notice holder; a new notice replaces the current one.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    duration: Duration,
    current: Option<Notice>,
}

impl NoticeBoard {
    pub fn new(duration: Duration) -> Self {
        Self { duration, current: None }
    }

    pub fn show(&mut self, message: impl Into<String>, level: NoticeLevel, now: Instant) -> &Notice {
        self.current.insert(Notice {
            message: message.into(),
            level,
            expires_at: now + self.duration,
        })
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref()
    }

    /// Drop the notice once its time is up. Returns true if one was removed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some(n) if now >= n.expires_at => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

pub fn device_added_message(device: &DeviceId) -> String {
    format!("New port added: {}", device)
}

pub fn device_removed_message(device: &DeviceId) -> String {
    format!("Port removed: {}", device)
}

/// Notice text for a session event, if it warrants one
pub fn notice_for(event: &SessionEvent) -> Option<(String, NoticeLevel)> {
    match event {
        SessionEvent::Reading { .. } => None,
        SessionEvent::ParseFailure(raw) => {
            Some((format!("Invalid data format: '{}'", raw), NoticeLevel::Warning))
        }
        SessionEvent::TransportError { device, .. } => {
            Some((format!("Error on port {}", device), NoticeLevel::Error))
        }
        SessionEvent::OpenFailed { reason, .. } => {
            Some((format!("Failed to open port: {}", reason), NoticeLevel::Error))
        }
        SessionEvent::Connected(device) => {
            Some((format!("Connected to {}", device), NoticeLevel::Info))
        }
        SessionEvent::Disconnected(device) => {
            Some((format!("Left port {}", device), NoticeLevel::Info))
        }
    }
}
