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

//! Monitor loop: the single consumer of transport events.
//!
//! Owns the session, the device poller and the display model. Everything
//! that mutates them runs inside `pump`, on whichever thread calls it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::display::{
    device_added_message, device_removed_message, notice_for, DisplayState, Notice, NoticeBoard,
    NoticeLevel,
};
use crate::error::Result;
use crate::logger;
use crate::ports::{DeviceDiff, DeviceEnumerator, DeviceId, DevicePoller};
use crate::reading::Reading;
use crate::session::{PortSession, SessionEvent, SessionSettings};
use crate::severity::{NormalizedSample, Rgb};
use crate::transport::{TaggedEvent, Transport};

/// Callbacks delivered on the monitor thread. All default to no-ops.
pub trait MonitorListener {
    fn on_reading(&mut self, _reading: &Reading, _sample: &NormalizedSample, _color: Rgb) {}
    fn on_parse_failure(&mut self, _raw: &str) {}
    fn on_device_list_changed(&mut self, _devices: &BTreeSet<DeviceId>, _diff: &DeviceDiff) {}
    /// Open failure or device error
    fn on_connection_error(&mut self, _device: &DeviceId, _reason: &str) {}
    fn on_connected(&mut self, _device: &DeviceId) {}
    fn on_disconnected(&mut self, _device: &DeviceId) {}
    fn on_notice(&mut self, _notice: &Notice) {}
    /// Periodic tick with the current display state
    fn on_refresh(&mut self, _display: &DisplayState) {}
}

pub struct Monitor<T: Transport, L: MonitorListener> {
    config: MonitorConfig,
    session: PortSession<T>,
    events: Receiver<TaggedEvent>,
    poller: DevicePoller,
    display: DisplayState,
    notices: NoticeBoard,
    listener: L,
    next_refresh: Instant,
    shut_down: bool,
}

impl<T: Transport, L: MonitorListener> Monitor<T, L> {
    pub fn new(
        config: MonitorConfig,
        transport: T,
        enumerator: Box<dyn DeviceEnumerator>,
        listener: L,
    ) -> Self {
        let (session, events) = PortSession::new(transport, SessionSettings::from(&config));
        let poller = DevicePoller::new(enumerator, config.poll_interval());
        let notices = NoticeBoard::new(config.notification_duration());
        let next_refresh = Instant::now() + config.refresh_interval();
        Self {
            config,
            session,
            events,
            poller,
            display: DisplayState::NoData,
            notices,
            listener,
            next_refresh,
            shut_down: false,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn session(&self) -> &PortSession<T> {
        &self.session
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notices.current()
    }

    /// Devices seen at the last poll
    pub fn devices(&self) -> &BTreeSet<DeviceId> {
        self.poller.known()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// User picked a device. Errors are also reported to the listener.
    pub fn select(&mut self, device: &DeviceId) -> Result<()> {
        let res = self.session.open(device, self.config.baud_rate);
        self.flush_session_events(Instant::now());
        res
    }

    /// User picked "none"
    pub fn deselect(&mut self) {
        self.session.deselect();
        self.flush_session_events(Instant::now());
    }

    /// Wait up to `timeout` for transport events, dispatch them, then run due timers.
    pub fn pump(&mut self, timeout: Duration) {
        let now = Instant::now();
        let wait = timeout
            .min(self.poller.remaining(now))
            .min(self.next_refresh.saturating_duration_since(now));

        match self.events.recv_timeout(wait) {
            Ok(first) => {
                self.session.handle_event(first);
                while let Ok(next) = self.events.try_recv() {
                    self.session.handle_event(next);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // the session holds a sender, so this only happens during teardown
            Err(RecvTimeoutError::Disconnected) => {}
        }

        let now = Instant::now();
        self.flush_session_events(now);
        self.tick(now);
    }

    /// Run device polling, the refresh tick and notice expiry if they are due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.poller.is_due(now) {
            let diff = self.poller.poll(now);
            if !diff.is_empty() {
                self.on_devices_changed(&diff, now);
            }
        }

        if now >= self.next_refresh {
            self.listener.on_refresh(&self.display);
            self.next_refresh = now + self.config.refresh_interval();
        }

        if self.notices.expire(now) {
            debug!("Notice expired");
        }
    }

    /// Loop until `shutdown` is raised, then tear down
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!("Monitor running");
        while !shutdown.load(Ordering::SeqCst) {
            self.pump(self.config.refresh_interval());
        }
        self.shutdown();
    }

    /// Release the device. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.session.close();
        self.display = DisplayState::NoData;
        logger::log_event("monitor_stopped", json!({}));
        info!("Monitor stopped");
    }

    fn on_devices_changed(&mut self, diff: &DeviceDiff, now: Instant) {
        for device in &diff.added {
            info!("Device added: {}", device);
            self.post_notice(device_added_message(device), NoticeLevel::Info, now);
        }
        for device in &diff.removed {
            info!("Device removed: {}", device);
            self.post_notice(device_removed_message(device), NoticeLevel::Warning, now);
        }
        logger::log_event(
            "device_list_changed",
            json!({
                "added": diff.added.iter().map(DeviceId::as_str).collect::<Vec<_>>(),
                "removed": diff.removed.iter().map(DeviceId::as_str).collect::<Vec<_>>(),
            }),
        );
        self.listener.on_device_list_changed(self.poller.known(), diff);

        if self.session.reconcile_selection(self.poller.known()) {
            self.flush_session_events(now);
        }
    }

    fn post_notice(&mut self, message: String, level: NoticeLevel, now: Instant) {
        let notice = self.notices.show(message, level, now);
        self.listener.on_notice(notice);
    }

    fn flush_session_events(&mut self, now: Instant) {
        for event in self.session.take_events() {
            self.dispatch(event, now);
        }
    }

    fn dispatch(&mut self, event: SessionEvent, now: Instant) {
        self.display.apply(&event);

        match &event {
            SessionEvent::Reading { reading, sample } => {
                logger::log_event(
                    "reading",
                    json!({ "raw": reading.raw_value, "percentage": sample.percentage }),
                );
                self.listener.on_reading(reading, sample, self.display.color());
            }
            SessionEvent::ParseFailure(raw) => {
                logger::log_event("parse_failure", json!({ "raw": raw }));
                self.listener.on_parse_failure(raw);
            }
            SessionEvent::TransportError { device, reason }
            | SessionEvent::OpenFailed { device, reason } => {
                self.listener.on_connection_error(device, reason);
            }
            SessionEvent::Connected(device) => self.listener.on_connected(device),
            SessionEvent::Disconnected(device) => self.listener.on_disconnected(device),
        }

        if let Some((message, level)) = notice_for(&event) {
            self.post_notice(message, level, now);
        }
    }
}

impl<T: Transport, L: MonitorListener> Drop for Monitor<T, L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
