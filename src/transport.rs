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

//! Line-oriented serial transport.
//!
//! A `Transport` opens a `Link` to one device. While the link is open, a
//! reader thread owned by the link pushes every received line (or device
//! error) into the consumer's channel through an `EventSink`. Each sink is
//! stamped with the generation of the link it belongs to so the consumer can
//! drop anything still in flight from a link it has already released.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{RadmonError, Result};
use crate::ports::DeviceId;

/// Read timeout of the serial handle; bounds how long `close` waits for the reader
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Longest line kept before it is forwarded without a terminator
pub const MAX_LINE_BYTES: usize = 4096;

pub type Generation = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Line(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: Generation,
    pub event: TransportEvent,
}

/// Producer half handed to a link. Sends fail once the consumer is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    tx: Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: Generation, tx: Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn line(&self, line: impl Into<String>) -> bool {
        self.send(TransportEvent::Line(line.into()))
    }

    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(reason.into()))
    }

    fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent { generation: self.generation, event })
            .is_ok()
    }
}

/// An open device connection
#[cfg_attr(test, mockall::automock)]
pub trait Link: Send {
    /// Stop delivering events and release the device
    fn close(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    fn open(&mut self, device: &DeviceId, baud_rate: u32, sink: EventSink) -> Result<Box<dyn Link>>;
}

/// Forward complete lines from `reader` until `stop` is raised, the stream
/// ends, the consumer goes away, or a non-timeout I/O error occurs.
///
/// A line never grows past `MAX_LINE_BYTES`; longer input is forwarded in
/// pieces of that size.
pub(crate) fn pump_lines<R: BufRead>(mut reader: R, sink: &EventSink, stop: &AtomicBool) {
    let mut buf: Vec<u8> = Vec::new();
    while !stop.load(Ordering::Acquire) {
        // buf is always below the cap here, so room is never zero
        let room = (MAX_LINE_BYTES - buf.len()) as u64;
        let res = (&mut reader).take(room).read_until(b'\n', &mut buf);
        match res {
            Ok(0) => {
                if !buf.is_empty() {
                    let _ = sink.line(String::from_utf8_lossy(&buf).into_owned());
                }
                let _ = sink.error("device closed the stream");
                return;
            }
            Ok(_) => {
                if (buf.last() == Some(&b'\n') || buf.len() >= MAX_LINE_BYTES) && !flush(&mut buf, sink) {
                    return;
                }
            }
            // partial data stays in buf across timeouts
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) => {
                if buf.len() >= MAX_LINE_BYTES && !flush(&mut buf, sink) {
                    return;
                }
            }
            Err(e) => {
                if !stop.load(Ordering::Acquire) {
                    let _ = sink.error(e.to_string());
                }
                return;
            }
        }
    }
}

/// Send `buf` as one line and clear it. False once the consumer is gone.
fn flush(buf: &mut Vec<u8>, sink: &EventSink) -> bool {
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    sink.line(line)
}

/// Transport backed by the `serialport` crate
#[derive(Debug, Clone)]
pub struct SerialTransport {
    read_timeout: Duration,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self { read_timeout: DEFAULT_READ_TIMEOUT }
    }
}

impl SerialTransport {
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, device: &DeviceId, baud_rate: u32, sink: EventSink) -> Result<Box<dyn Link>> {
        let port = serialport::new(device.as_str(), baud_rate)
            .timeout(self.read_timeout)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| RadmonError::open_failure(device.as_str(), e.description))?;

        let reader_port = port
            .try_clone()
            .map_err(|e| RadmonError::open_failure(device.as_str(), e.description))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_reader = Arc::clone(&stop);
        let name = device.to_string();
        let reader = thread::Builder::new()
            .name("radmon-serial-reader".to_string())
            .spawn(move || {
                debug!("Reader for {} started", name);
                pump_lines(BufReader::new(reader_port), &sink, &stop_reader);
                debug!("Reader for {} stopped", name);
            })
            .map_err(|e| RadmonError::open_failure(device.as_str(), e.to_string()))?;

        Ok(Box::new(SerialLink {
            port: Some(port),
            stop,
            reader: Some(reader),
        }))
    }
}

pub struct SerialLink {
    port: Option<Box<dyn serialport::SerialPort>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Link for SerialLink {
    fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        // Dropping the handle closes the device; the reader's clone goes with its thread.
        self.port.take();
        if let Some(handle) = self.reader.take() {
            handle
                .join()
                .map_err(|_| RadmonError::transport("serial reader thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if self.reader.is_some() || self.port.is_some() {
            if let Err(e) = self.close() {
                warn!("Closing serial link on drop failed: {}", e);
            }
        }
    }
}
