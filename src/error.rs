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

//! Unified error handling for Radmon
//!
//! A single error type shared by the session, the transport and the
//! configuration layer. Runtime failures are converted into monitor events
//! at the boundary where they occur; none of them terminate the process.

use std::io;

/// Result type alias using RadmonError
pub type Result<T> = std::result::Result<T, RadmonError>;

#[derive(thiserror::Error, Debug)]
pub enum RadmonError {
    // ============================================================================
    // Device and Transport Errors
    // ============================================================================
    #[error("Serial port enumeration unavailable: {0}")]
    EnumerationUnsupported(String),

    #[error("Failed to open {device}: {reason}")]
    OpenFailure {
        device: String,
        reason: String,
    },

    #[error("Invalid data format: '{0}'")]
    ParseFailure(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    // ============================================================================
    // I/O and Configuration Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl RadmonError {
    pub fn open_failure(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpenFailure {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportError(reason.into())
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag used by the event journal
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnumerationUnsupported(_) => "enumeration_unsupported",
            Self::OpenFailure { .. } => "open_failure",
            Self::ParseFailure(_) => "parse_failure",
            Self::TransportError(_) => "transport_error",
            Self::Io(_) => "io",
            Self::JsonParse(_) => "json_parse",
            Self::Config(_) => "config",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}
