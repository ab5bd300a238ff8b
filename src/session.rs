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

//! Port session: the single owner of the device link.
//!
//! All methods run on the consumer thread. Data from the device arrives
//! through the receiver returned by `PortSession::new` and is handed back
//! via `handle_event`; nothing else touches session state.

use std::collections::BTreeSet;
use std::mem;
use std::sync::mpsc::{self, Receiver, Sender};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, TransportErrorPolicy};
use crate::error::{RadmonError, Result};
use crate::logger;
use crate::ports::DeviceId;
use crate::reading::{parse_line, Reading};
use crate::severity::{normalize_with, ClampPolicy, NormalizedSample};
use crate::transport::{EventSink, Generation, Link, TaggedEvent, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The device reported an error; the link is still held
    Error(String),
}

/// What the session reports upward after each operation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Reading { reading: Reading, sample: NormalizedSample },
    ParseFailure(String),
    /// Device error after a successful open
    TransportError { device: DeviceId, reason: String },
    /// Opening a device failed; the selection has been cleared
    OpenFailed { device: DeviceId, reason: String },
    Connected(DeviceId),
    Disconnected(DeviceId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub max_radiation_value: f64,
    pub clamp_policy: ClampPolicy,
    pub transport_error_policy: TransportErrorPolicy,
}

impl From<&MonitorConfig> for SessionSettings {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            max_radiation_value: cfg.max_radiation_value,
            clamp_policy: cfg.clamp_policy,
            transport_error_policy: cfg.transport_error_policy,
        }
    }
}

pub struct PortSession<T: Transport> {
    transport: T,
    settings: SessionSettings,
    state: ConnectionState,
    selected: Option<DeviceId>,
    link: Option<Box<dyn Link>>,
    generation: Generation,
    tx: Sender<TaggedEvent>,
    last_sample: Option<NormalizedSample>,
    pending: Vec<SessionEvent>,
}

impl<T: Transport> PortSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> (Self, Receiver<TaggedEvent>) {
        let (tx, rx) = mpsc::channel();
        let session = Self {
            transport,
            settings,
            state: ConnectionState::Disconnected,
            selected: None,
            link: None,
            generation: 0,
            tx,
            last_sample: None,
            pending: Vec::new(),
        };
        (session, rx)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn selected(&self) -> Option<&DeviceId> {
        self.selected.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Last valid sample; cleared by any parse failure, device error or close
    pub fn last_sample(&self) -> Option<NormalizedSample> {
        self.last_sample
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Events produced since the last call, in order
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.pending)
    }

    /// Open `device`, releasing any current link first.
    pub fn open(&mut self, device: &DeviceId, baud_rate: u32) -> Result<()> {
        self.close();

        self.state = ConnectionState::Connecting;
        self.generation += 1;
        let sink = EventSink::new(self.generation, self.tx.clone());

        match self.transport.open(device, baud_rate, sink) {
            Ok(link) => {
                self.link = Some(link);
                self.selected = Some(device.clone());
                self.state = ConnectionState::Connected;
                info!("Connected to {} at {} baud", device, baud_rate);
                logger::log_event("port_opened", json!({ "device": device.as_str(), "baud": baud_rate }));
                self.pending.push(SessionEvent::Connected(device.clone()));
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    RadmonError::OpenFailure { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.state = ConnectionState::Disconnected;
                self.selected = None;
                warn!("Failed to open {}: {}", device, reason);
                logger::log_event("open_failed", json!({ "device": device.as_str(), "error": reason }));
                self.pending.push(SessionEvent::OpenFailed {
                    device: device.clone(),
                    reason: reason.clone(),
                });
                Err(RadmonError::open_failure(device.as_str(), reason))
            }
        }
    }

    /// Release the current link. No-op when nothing is open; close errors are logged.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            // anything the released link already queued is now stale
            self.generation += 1;
            if let Err(e) = link.close() {
                warn!("Error while closing port: {}", e);
                logger::log_event("close_failed", json!({ "error": e.to_string(), "kind": e.kind() }));
            }
            if let Some(device) = &self.selected {
                debug!("Released {}", device);
            }
        }
        self.selected = None;
        self.last_sample = None;
        self.state = ConnectionState::Disconnected;
    }

    /// User chose "none": report which device was left, then close
    pub fn deselect(&mut self) {
        if let Some(device) = self.selected.clone() {
            info!("Left port {}", device);
            self.pending.push(SessionEvent::Disconnected(device));
        }
        self.close();
    }

    /// Drop the selection if its device is no longer attached.
    /// Returns true when the selection was cleared.
    pub fn reconcile_selection(&mut self, available: &BTreeSet<DeviceId>) -> bool {
        match &self.selected {
            Some(device) if !available.contains(device) => {
                warn!("Selected port {} disappeared", device);
                self.deselect();
                true
            }
            _ => false,
        }
    }

    /// Route an event from the transport channel
    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation || self.link.is_none() {
            debug!(
                "Dropping stale transport event (gen {} != {})",
                tagged.generation, self.generation
            );
            return;
        }
        match tagged.event {
            TransportEvent::Line(line) => self.on_line_received(&line),
            TransportEvent::Error(reason) => self.on_device_error(&reason),
        }
    }

    pub fn on_line_received(&mut self, line: &str) {
        match parse_line(line) {
            Ok(reading) => {
                let sample = normalize_with(
                    reading.raw_value,
                    self.settings.max_radiation_value,
                    self.settings.clamp_policy,
                );
                self.last_sample = Some(sample);
                if matches!(self.state, ConnectionState::Error(_)) {
                    self.state = ConnectionState::Connected;
                }
                self.pending.push(SessionEvent::Reading { reading, sample });
            }
            Err(RadmonError::ParseFailure(raw)) => {
                debug!("Unparseable line: '{}'", raw);
                self.last_sample = None;
                self.pending.push(SessionEvent::ParseFailure(raw));
            }
            Err(other) => {
                self.last_sample = None;
                self.pending.push(SessionEvent::ParseFailure(other.to_string()));
            }
        }
    }

    pub fn on_device_error(&mut self, reason: &str) {
        let device = match &self.selected {
            Some(d) => d.clone(),
            None => return,
        };
        warn!("Error on port {}: {}", device, reason);
        logger::log_event("transport_error", json!({ "device": device.as_str(), "error": reason }));
        self.last_sample = None;
        self.pending.push(SessionEvent::TransportError {
            device: device.clone(),
            reason: reason.to_string(),
        });

        match self.settings.transport_error_policy {
            TransportErrorPolicy::StayOpen => {
                self.state = ConnectionState::Error(reason.to_string());
            }
            TransportErrorPolicy::AutoClose => {
                self.pending.push(SessionEvent::Disconnected(device));
                self.close();
            }
        }
    }
}

impl<T: Transport> Drop for PortSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::{set_of, FakeTransport};
    use crate::transport::{MockLink, MockTransport};
    use mockall::Sequence;

    fn settings() -> SessionSettings {
        SessionSettings::from(&MonitorConfig::default())
    }

    fn open_session() -> (PortSession<FakeTransport>, Receiver<TaggedEvent>, FakeTransport) {
        let transport = FakeTransport::new();
        let handle = transport.clone();
        let (mut session, rx) = PortSession::new(transport, settings());
        session.open(&DeviceId::from("COM3"), 9600).unwrap();
        session.take_events();
        (session, rx, handle)
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let (session, _rx) = PortSession::new(FakeTransport::new(), settings());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
        assert!(session.selected().is_none());
        assert!(!session.is_open());
    }

    #[test]
    fn test_open_connects_and_reports() {
        let transport = FakeTransport::new();
        let (mut session, _rx) = PortSession::new(transport.clone(), settings());
        session.open(&DeviceId::from("COM3"), 9600).unwrap();
        assert_eq!(session.state(), &ConnectionState::Connected);
        assert_eq!(session.selected(), Some(&DeviceId::from("COM3")));
        assert_eq!(session.take_events(), vec![SessionEvent::Connected(DeviceId::from("COM3"))]);
        assert_eq!(transport.opened(), vec![(DeviceId::from("COM3"), 9600)]);
    }

    #[test]
    fn test_reopen_closes_prior_link_first() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();

        transport
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                let mut link = MockLink::new();
                link.expect_close().times(1).returning(|| Ok(()));
                Ok(Box::new(link) as Box<dyn Link>)
            });
        transport
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                let mut link = MockLink::new();
                link.expect_close().times(1).returning(|| Ok(()));
                Ok(Box::new(link) as Box<dyn Link>)
            });

        let (mut session, _rx) = PortSession::new(transport, settings());
        session.open(&DeviceId::from("A"), 9600).unwrap();
        session.open(&DeviceId::from("B"), 9600).unwrap();
        assert_eq!(session.selected(), Some(&DeviceId::from("B")));
        assert!(session.is_open());
        // MockLink for B is closed when the session drops
    }

    #[test]
    fn test_close_count_before_second_open_is_one() {
        let transport = FakeTransport::new();
        let (mut session, _rx) = PortSession::new(transport.clone(), settings());
        session.open(&DeviceId::from("A"), 9600).unwrap();
        session.open(&DeviceId::from("B"), 9600).unwrap();
        assert_eq!(transport.close_count_at_open(1), Some(1));
        assert_eq!(transport.live_links(), 1);
    }

    #[test]
    fn test_close_when_nothing_open_is_noop() {
        let transport = FakeTransport::new();
        let (mut session, _rx) = PortSession::new(transport.clone(), settings());
        session.close();
        session.close();
        assert_eq!(transport.close_count(), 0);
        assert_eq!(session.state(), &ConnectionState::Disconnected);
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn test_close_clears_handle_even_on_error() {
        let mut transport = MockTransport::new();
        transport.expect_open().returning(|_, _, _| {
            let mut link = MockLink::new();
            link.expect_close()
                .times(1)
                .returning(|| Err(RadmonError::transport("close exploded")));
            Ok(Box::new(link) as Box<dyn Link>)
        });
        let (mut session, _rx) = PortSession::new(transport, settings());
        session.open(&DeviceId::from("A"), 9600).unwrap();
        session.close();
        assert!(!session.is_open());
        assert!(session.selected().is_none());
        assert_eq!(session.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_failure_reverts_selection() {
        let transport = FakeTransport::new();
        let (mut session, _rx) = PortSession::new(transport.clone(), settings());
        session.open(&DeviceId::from("A"), 9600).unwrap();
        transport.fail_next_open("Access denied");

        let err = session.open(&DeviceId::from("B"), 9600).unwrap_err();
        assert!(matches!(err, RadmonError::OpenFailure { ref device, ref reason }
            if device == "B" && reason == "Access denied"));
        assert_eq!(session.state(), &ConnectionState::Disconnected);
        assert!(session.selected().is_none());
        assert!(!session.is_open());
        // A was released before the attempt on B
        assert_eq!(transport.live_links(), 0);

        let events = session.take_events();
        assert_eq!(
            events.last(),
            Some(&SessionEvent::OpenFailed {
                device: DeviceId::from("B"),
                reason: "Access denied".to_string()
            })
        );
    }

    #[test]
    fn test_line_received_emits_normalized_reading() {
        let (mut session, rx, transport) = open_session();
        transport.sink(0).line("5000\n");
        session.handle_event(rx.recv().unwrap());
        match session.take_events().as_slice() {
            [SessionEvent::Reading { reading, sample }] => {
                assert_eq!(reading.raw_value, 5000.0);
                assert_eq!(sample.percentage, 50.0);
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(session.last_sample().map(|s| s.percentage), Some(50.0));
    }

    #[test]
    fn test_parse_failure_clears_last_sample() {
        let (mut session, _rx, _t) = open_session();
        session.on_line_received("12.34");
        assert!(session.last_sample().is_some());
        session.on_line_received("abc");
        assert!(session.last_sample().is_none());
        let events = session.take_events();
        assert_eq!(events[1], SessionEvent::ParseFailure("abc".to_string()));
    }

    #[test]
    fn test_stale_events_from_released_link_are_dropped() {
        let (mut session, rx, transport) = open_session();
        let old_sink = transport.sink(0);
        session.open(&DeviceId::from("COM4"), 9600).unwrap();
        session.take_events();

        old_sink.line("9999\n");
        transport.sink(1).line("10\n");

        session.handle_event(rx.recv().unwrap());
        session.handle_event(rx.recv().unwrap());
        match session.take_events().as_slice() {
            [SessionEvent::Reading { reading, .. }] => assert_eq!(reading.raw_value, 10.0),
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_events_after_close_are_dropped() {
        let (mut session, rx, transport) = open_session();
        let sink = transport.sink(0);
        session.close();
        sink.line("1\n");
        session.handle_event(rx.recv().unwrap());
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn test_device_error_stays_open_by_default() {
        let (mut session, rx, transport) = open_session();
        session.on_line_received("100");
        transport.sink(0).error("framing error");
        session.handle_event(rx.recv().unwrap());

        assert!(session.is_open());
        assert_eq!(session.state(), &ConnectionState::Error("framing error".to_string()));
        assert!(session.last_sample().is_none());
        assert_eq!(transport.close_count(), 0);

        // next good line brings it back
        session.on_line_received("200");
        assert_eq!(session.state(), &ConnectionState::Connected);
    }

    #[test]
    fn test_device_error_auto_close_policy() {
        let transport = FakeTransport::new();
        let mut s = settings();
        s.transport_error_policy = TransportErrorPolicy::AutoClose;
        let (mut session, _rx) = PortSession::new(transport.clone(), s);
        session.open(&DeviceId::from("COM3"), 9600).unwrap();
        session.take_events();

        session.on_device_error("unplugged");
        assert!(!session.is_open());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(
            session.take_events(),
            vec![
                SessionEvent::TransportError {
                    device: DeviceId::from("COM3"),
                    reason: "unplugged".to_string()
                },
                SessionEvent::Disconnected(DeviceId::from("COM3")),
            ]
        );
    }

    #[test]
    fn test_reconcile_selection() {
        let (mut session, _rx, transport) = open_session();
        assert!(!session.reconcile_selection(&set_of(&["COM1", "COM3"])));
        assert!(session.is_open());

        assert!(session.reconcile_selection(&set_of(&["COM1"])));
        assert!(!session.is_open());
        assert!(session.selected().is_none());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(session.take_events(), vec![SessionEvent::Disconnected(DeviceId::from("COM3"))]);
    }

    #[test]
    fn test_deselect_reports_and_closes() {
        let (mut session, _rx, transport) = open_session();
        session.deselect();
        assert_eq!(session.take_events(), vec![SessionEvent::Disconnected(DeviceId::from("COM3"))]);
        assert_eq!(transport.close_count(), 1);

        session.deselect();
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn test_drop_releases_link() {
        let (session, _rx, transport) = open_session();
        drop(session);
        assert_eq!(transport.live_links(), 0);
    }

    #[test]
    fn test_custom_scale_applies() {
        let transport = FakeTransport::new();
        let mut s = settings();
        s.max_radiation_value = 1_000_000.0;
        let (mut session, _rx) = PortSession::new(transport, s);
        session.open(&DeviceId::from("COM3"), 9600).unwrap();
        session.on_line_received("250000");
        assert_eq!(session.last_sample().map(|s| s.percentage), Some(25.0));
    }
}
