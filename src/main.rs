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

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{error, info, warn};

use radmon::config::{config_path, load_config};
use radmon::display::{DisplayState, Notice, NoticeLevel};
use radmon::logger;
use radmon::monitor::{Monitor, MonitorListener};
use radmon::ports::{list_devices, DeviceDiff, DeviceId, SerialEnumerator};
use radmon::reading::Reading;
use radmon::severity::{NormalizedSample, Rgb};
use radmon::transport::SerialTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global shutdown flag, raised by Ctrl-C
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Reports monitor events through tracing
struct ConsoleListener {
    last: Option<String>,
}

impl MonitorListener for ConsoleListener {
    fn on_reading(&mut self, reading: &Reading, sample: &NormalizedSample, color: Rgb) {
        info!(
            "{:.2} nSv/h  {:.2}%  {}{}",
            reading.raw_value,
            sample.percentage,
            color.to_hex(),
            if sample.clamped_from_raw { "  (out of range)" } else { "" }
        );
    }

    fn on_device_list_changed(&mut self, devices: &BTreeSet<DeviceId>, _diff: &DeviceDiff) {
        info!("Available ports: {}", join(devices));
    }

    fn on_notice(&mut self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
    }

    fn on_refresh(&mut self, display: &DisplayState) {
        // only report transitions into "no data"
        let text = display.dose_rate_text();
        if !display.is_live() && self.last.as_deref() != Some(text.as_str()) {
            info!("Radiation level: {}", text);
        }
        self.last = Some(text);
    }
}

fn join(devices: &BTreeSet<DeviceId>) -> String {
    if devices.is_empty() {
        return "(none)".to_string();
    }
    devices.iter().map(DeviceId::as_str).collect::<Vec<_>>().join(", ")
}

fn print_help() {
    eprintln!("radmon {} - radiation level monitor", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    radmon [OPTIONS] [DEVICE]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -l, --list          List available serial ports and exit");
    eprintln!("        --logging       Write a JSON event journal");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    RADMON_LOG              Log level (trace, debug, info, warn, error)");
    eprintln!("    RADMON_MAX_RADIATION    Raw value shown as 100%");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut logging_enabled = false;
    let mut list_only = false;
    let mut device: Option<DeviceId> = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("radmon {}", VERSION);
                return Ok(());
            }
            "-l" | "--list" => list_only = true,
            "--logging" => logging_enabled = true,
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
            name => device = Some(DeviceId::new(name)),
        }
    }

    let log_level = std::env::var("RADMON_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();

    if list_only {
        for d in list_devices(&SerialEnumerator) {
            println!("{}", d);
        }
        return Ok(());
    }

    if logging_enabled {
        match logger::init_logging() {
            Some(path) => info!("Event journal: {}", path.display()),
            None => warn!("Event journal could not be opened"),
        }
        logger::log_event("startup", serde_json::json!({ "version": VERSION, "args": args }));
    }

    let config = load_config()
        .with_context(|| format!("loading config from {}", config_path().display()))?;
    info!(
        "radmon {} starting (scale {} nSv/h = 100%, {} baud)",
        VERSION, config.max_radiation_value, config.baud_rate
    );

    if let Err(e) = ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let mut monitor = Monitor::new(
        config,
        SerialTransport::default(),
        Box::new(SerialEnumerator),
        ConsoleListener { last: None },
    );
    info!("Available ports: {}", join(monitor.devices()));

    if let Some(device) = device {
        // failures are reported through the listener; keep running for hot-plug
        if let Err(e) = monitor.select(&device) {
            warn!("{}", e);
        }
    }

    monitor.run(&SHUTDOWN);
    Ok(())
}
