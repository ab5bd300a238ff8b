/*
 * Test utilities and fakes for Radmon
 *
 * Shared by the unit test modules: an in-memory transport that records
 * every open and close, a scriptable device enumerator, and a listener
 * that records what the monitor reported.
 */

#[cfg(test)]
pub mod test_utils {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    use crate::display::{DisplayState, Notice};
    use crate::error::{RadmonError, Result};
    use crate::monitor::MonitorListener;
    use crate::ports::{DeviceDiff, DeviceEnumerator, DeviceId};
    use crate::reading::Reading;
    use crate::severity::{NormalizedSample, Rgb};
    use crate::transport::{EventSink, Link, Transport};

    pub fn set_of(ids: &[&str]) -> BTreeSet<DeviceId> {
        ids.iter().map(|s| DeviceId::from(*s)).collect()
    }

    #[derive(Default)]
    struct TransportLog {
        opened: Vec<(DeviceId, u32)>,
        sinks: Vec<EventSink>,
        closes: usize,
        closes_at_open: Vec<usize>,
        live: usize,
        fail_next: Option<String>,
    }

    /// Transport that never touches hardware. Clones share one log.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        log: Arc<Mutex<TransportLog>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn log(&self) -> MutexGuard<'_, TransportLog> {
            self.log.lock().unwrap()
        }

        /// Successful opens, in order
        pub fn opened(&self) -> Vec<(DeviceId, u32)> {
            self.log().opened.clone()
        }

        /// Sink handed to the `index`-th successful open
        pub fn sink(&self, index: usize) -> EventSink {
            self.log().sinks[index].clone()
        }

        pub fn close_count(&self) -> usize {
            self.log().closes
        }

        /// How many closes had happened when open attempt `index` started
        pub fn close_count_at_open(&self, index: usize) -> Option<usize> {
            self.log().closes_at_open.get(index).copied()
        }

        pub fn live_links(&self) -> usize {
            self.log().live
        }

        pub fn fail_next_open(&self, reason: &str) {
            self.log().fail_next = Some(reason.to_string());
        }
    }

    impl Transport for FakeTransport {
        fn open(&mut self, device: &DeviceId, baud_rate: u32, sink: EventSink) -> Result<Box<dyn Link>> {
            let mut log = self.log();
            let closes = log.closes;
            log.closes_at_open.push(closes);
            if let Some(reason) = log.fail_next.take() {
                return Err(RadmonError::open_failure(device.as_str(), reason));
            }
            log.opened.push((device.clone(), baud_rate));
            log.sinks.push(sink);
            log.live += 1;
            Ok(Box::new(FakeLink {
                log: Arc::clone(&self.log),
                closed: false,
            }))
        }
    }

    struct FakeLink {
        log: Arc<Mutex<TransportLog>>,
        closed: bool,
    }

    impl Link for FakeLink {
        fn close(&mut self) -> Result<()> {
            if !self.closed {
                self.closed = true;
                let mut log = self.log.lock().unwrap();
                log.closes += 1;
                log.live -= 1;
            }
            Ok(())
        }
    }

    impl Drop for FakeLink {
        fn drop(&mut self) {
            let _ = self.close();
        }
    }

    /// Enumerator whose device set tests can change between polls
    #[derive(Clone, Default)]
    pub struct StaticEnumerator {
        devices: Arc<Mutex<BTreeSet<DeviceId>>>,
        failing: Arc<AtomicBool>,
    }

    impl StaticEnumerator {
        pub fn with(ids: &[&str]) -> Self {
            let e = Self::default();
            e.set(ids);
            e
        }

        pub fn set(&self, ids: &[&str]) {
            *self.devices.lock().unwrap() = set_of(ids);
        }

        /// Make every query fail until cleared
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl DeviceEnumerator for StaticEnumerator {
        fn available(&self) -> Result<BTreeSet<DeviceId>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RadmonError::EnumerationUnsupported("enumeration failed".into()));
            }
            Ok(self.devices.lock().unwrap().clone())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum ListenerCall {
        Reading { raw: f64, percentage: f64, color: Rgb },
        ParseFailure(String),
        DeviceListChanged { added: BTreeSet<DeviceId>, removed: BTreeSet<DeviceId> },
        ConnectionError { device: DeviceId, reason: String },
        Connected(DeviceId),
        Disconnected(DeviceId),
        Notice(String),
        Refresh { live: bool },
    }

    /// Listener that records every callback. Clones share the record.
    #[derive(Clone, Default)]
    pub struct RecordingListener {
        calls: Arc<Mutex<Vec<ListenerCall>>>,
    }

    impl RecordingListener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<ListenerCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn notices(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    ListenerCall::Notice(m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, call: ListenerCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MonitorListener for RecordingListener {
        fn on_reading(&mut self, reading: &Reading, sample: &NormalizedSample, color: Rgb) {
            self.push(ListenerCall::Reading {
                raw: reading.raw_value,
                percentage: sample.percentage,
                color,
            });
        }

        fn on_parse_failure(&mut self, raw: &str) {
            self.push(ListenerCall::ParseFailure(raw.to_string()));
        }

        fn on_device_list_changed(&mut self, _devices: &BTreeSet<DeviceId>, diff: &DeviceDiff) {
            self.push(ListenerCall::DeviceListChanged {
                added: diff.added.clone(),
                removed: diff.removed.clone(),
            });
        }

        fn on_connection_error(&mut self, device: &DeviceId, reason: &str) {
            self.push(ListenerCall::ConnectionError {
                device: device.clone(),
                reason: reason.to_string(),
            });
        }

        fn on_connected(&mut self, device: &DeviceId) {
            self.push(ListenerCall::Connected(device.clone()));
        }

        fn on_disconnected(&mut self, device: &DeviceId) {
            self.push(ListenerCall::Disconnected(device.clone()));
        }

        fn on_notice(&mut self, notice: &Notice) {
            self.push(ListenerCall::Notice(notice.message.clone()));
        }

        fn on_refresh(&mut self, display: &DisplayState) {
            self.push(ListenerCall::Refresh { live: display.is_live() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use crate::ports::DeviceEnumerator;
    use crate::transport::Transport;
    use std::sync::mpsc;

    #[test]
    fn test_fake_transport_tracks_links() {
        let mut transport = FakeTransport::new();
        let (tx, _rx) = mpsc::channel();
        let mut link = transport
            .open(&"COM1".into(), 9600, crate::transport::EventSink::new(1, tx))
            .unwrap();
        assert_eq!(transport.live_links(), 1);
        link.close().unwrap();
        link.close().unwrap();
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.live_links(), 0);
    }

    #[test]
    fn test_static_enumerator_updates() {
        let e = StaticEnumerator::with(&["A"]);
        assert_eq!(e.available().unwrap(), set_of(&["A"]));
        e.set(&["B", "C"]);
        assert_eq!(e.available().unwrap(), set_of(&["B", "C"]));
    }
}
