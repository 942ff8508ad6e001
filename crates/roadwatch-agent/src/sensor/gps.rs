// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial NMEA GPS receiver.
//!
//! A background thread reads lines from the serial device and forwards
//! `$GPGGA` sentences over a channel, so [`GpsReceiver::latest_fix`] never
//! blocks the collector tick.
//!
//! Read errors are retried after [`READ_RETRY_DELAY`]. After
//! [`MAX_CONSECUTIVE_READ_ERRORS`] failures in a row the reader thread exits
//! and the receiver reports [`SensorReadError::Disconnected`] until the agent
//! is restarted.

use super::nmea::{parse_gpgga, GPGGA_PREFIX};
use super::SensorReadError;
use crate::sample::GpsFix;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Buffered sentences between two polls before the reader drops input.
const LINE_BACKLOG: usize = 64;

/// Longest accepted line. NMEA caps sentences at 82 characters.
const MAX_LINE_LEN: usize = 256;

/// Pause before retrying a failed serial read.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Consecutive read failures tolerated before the reader gives up.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;

/// GPS receiver attached to a serial device.
pub struct GpsReceiver {
    lines: Receiver<String>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    device: String,
}

impl GpsReceiver {
    /// Open a serial device in raw mode at `baud`.
    ///
    /// Reads time out after one second so the reader thread can notice
    /// [`close`](Self::close).
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self, SensorReadError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).open(path)?;
        configure_serial(&file, baud)?;

        let receiver = Self::from_reader(file, path.display().to_string());
        tracing::info!("GPS receiver connected on {} ({} baud)", receiver.device, baud);
        Ok(receiver)
    }

    /// Attach to any line-oriented reader. A zero-length read is treated as
    /// a read timeout, not end of stream.
    pub fn from_reader<R: Read + Send + 'static>(reader: R, device: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::sync_channel(LINE_BACKLOG);
        let stop = Arc::new(AtomicBool::new(false));
        let device = device.into();

        let thread_stop = Arc::clone(&stop);
        let thread_device = device.clone();
        let handle = std::thread::Builder::new()
            .name("gps-reader".to_string())
            .spawn(move || read_lines(reader, tx, thread_stop, thread_device))
            .ok();

        if handle.is_none() {
            tracing::error!("Failed to spawn GPS reader thread for {}", device);
        }

        Self {
            lines: rx,
            stop,
            reader: handle,
            device,
        }
    }

    /// Drain pending sentences and return the newest valid fix, if any.
    pub fn latest_fix(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
        let mut latest = None;
        loop {
            match self.lines.try_recv() {
                Ok(line) => {
                    if let Some(fix) = parse_gpgga(&line) {
                        latest = Some(fix);
                    } else {
                        tracing::trace!("Ignoring GPGGA sentence without fix: {}", line);
                    }
                }
                Err(TryRecvError::Empty) => return Ok(latest),
                Err(TryRecvError::Disconnected) => {
                    if latest.is_some() {
                        return Ok(latest);
                    }
                    return Err(SensorReadError::Disconnected("gps"));
                }
            }
        }
    }

    /// Device path or label
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Stop the reader thread and close the device.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                tracing::warn!("GPS reader thread for {} panicked", self.device);
            }
        }
    }
}

impl Drop for GpsReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// Read timed out with nothing new
    Idle,
    /// Bytes appended, no newline yet
    Partial,
    /// `buf` ends with a newline
    Complete,
    /// `buf` reached [`MAX_LINE_LEN`] without a newline
    Overflow,
}

/// Append at most `MAX_LINE_LEN - buf.len()` bytes up to the next newline.
///
/// `buf` must be shorter than [`MAX_LINE_LEN`] on entry.
fn fill_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead> {
    let room = MAX_LINE_LEN.saturating_sub(buf.len()) as u64;
    let n = reader.by_ref().take(room).read_until(b'\n', buf)?;

    let state = if buf.last() == Some(&b'\n') {
        LineRead::Complete
    } else if buf.len() >= MAX_LINE_LEN {
        LineRead::Overflow
    } else if n == 0 {
        LineRead::Idle
    } else {
        LineRead::Partial
    };
    Ok(state)
}

fn read_lines<R: Read>(
    reader: R,
    tx: mpsc::SyncSender<String>,
    stop: Arc<AtomicBool>,
    device: String,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE_LEN);
    let mut discarding = false;
    let mut read_errors = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let state = match fill_line(&mut reader, &mut buf) {
            Ok(state) => {
                read_errors = 0;
                state
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                read_errors += 1;
                if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    tracing::error!(
                        "GPS read error on {} ({} in a row), giving up: {}",
                        device,
                        read_errors,
                        e
                    );
                    break;
                }
                tracing::warn!("GPS read error on {}, retrying: {}", device, e);
                std::thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        match state {
            // Timeout with nothing pending; a partial line stays in `buf`
            LineRead::Idle | LineRead::Partial => continue,
            LineRead::Overflow => {
                if !discarding {
                    tracing::debug!("Oversized line on {}, discarding", device);
                }
                discarding = true;
                buf.clear();
                continue;
            }
            LineRead::Complete if discarding => {
                // Tail of an oversized line
                discarding = false;
                buf.clear();
                continue;
            }
            LineRead::Complete => {}
        }

        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        buf.clear();

        if !line.starts_with(GPGGA_PREFIX) {
            continue;
        }
        match tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => {
                tracing::debug!("GPS backlog full on {}, dropping sentence", device);
            }
            Err(mpsc::TrySendError::Disconnected(_)) => break,
        }
    }

    tracing::debug!("GPS reader on {} stopped", device);
}

/// Raw 8N1 mode, `VMIN = 0` / `VTIME = 10` (1s read timeout).
fn configure_serial(file: &File, baud: u32) -> Result<(), SensorReadError> {
    let speed = baud_constant(baud)
        .ok_or_else(|| SensorReadError::Malformed(format!("unsupported baud rate {}", baud)))?;
    let fd = file.as_raw_fd();

    // SAFETY: `fd` is an open descriptor owned by `file` for the duration of
    // these calls, and `termios` is fully initialised by `tcgetattr` before use.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 10;
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        libc::tcflush(fd, libc::TCIFLUSH);
    }

    Ok(())
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    };
    Some(speed)
}
