//! Device multiplexer for the shared serial bus.
//!
//! One serial line physically connects to exactly one of two
//! peripherals (the distance sensor or the remote tilt actuator) via
//! a single switching signal. After every switch the line is unreliable
//! until a fixed settle interval has passed, so `switch_to` sleeps the
//! settle delay and discards any pending unread bytes before returning.
//!
//! The control loop is single-threaded, so send/receive pairs can never
//! interleave across owners; exclusivity is structural, not locked.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use rig_common::config::BusConfig;
use rig_common::hal::{HalError, RigHal};
use rig_common::state::BusOwner;

/// Sensor trigger byte.
const MEASURE_TRIGGER: u8 = 0x5A;
/// Sensor frame header (two bytes).
const FRAME_HEADER: u8 = 0x59;
/// Range bytes marking an out-of-range measurement.
const RANGE_ERROR: [u8; 2] = [0xFF, 0xFF];

/// Bus-level failures.
#[derive(Debug, Error)]
pub enum BusError {
    /// No reply within the fixed timeout.
    #[error("bus timeout waiting for {0}")]
    Timeout(&'static str),

    /// The sensor reported the out-of-range pattern.
    #[error("measurement out of range")]
    OutOfRange,

    /// Reply received but not in the expected shape.
    #[error("bad reply: {0}")]
    BadReply(String),

    #[error(transparent)]
    Hal(#[from] HalError),
}

/// Arbitrates the shared serial line between the two peripherals.
#[derive(Debug)]
pub struct DeviceMux {
    owner: Option<BusOwner>,
    settle: Duration,
    read_timeout: Duration,
    ack_timeout: Duration,
    /// Owner switches performed, for diagnostics.
    switch_count: u64,
}

impl DeviceMux {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            owner: None,
            settle: Duration::from_millis(config.settle_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            switch_count: 0,
        }
    }

    /// Current owner of the line, if any switch has happened yet.
    #[inline]
    pub fn owner(&self) -> Option<BusOwner> {
        self.owner
    }

    #[inline]
    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    /// Connect the line to `owner`.
    ///
    /// Discards pending unread bytes from the previous owner and waits
    /// the settle interval before the bus is considered reliable. A
    /// no-op when the owner already holds the line.
    pub fn switch_to<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        owner: BusOwner,
    ) -> Result<(), BusError> {
        if self.owner == Some(owner) {
            return Ok(());
        }
        debug!(?owner, "bus switch");
        hal.bus_select(owner)?;
        hal.bus_flush();
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        self.owner = Some(owner);
        self.switch_count += 1;
        Ok(())
    }

    /// Write bytes to the current owner.
    pub fn send<H: RigHal + ?Sized>(&mut self, hal: &mut H, bytes: &[u8]) -> Result<(), BusError> {
        trace!(len = bytes.len(), owner = ?self.owner, "bus send");
        hal.bus_write(bytes)?;
        Ok(())
    }

    /// Read into `buf` with the given timeout; 0 bytes is a timeout.
    pub fn receive<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        buf: &mut [u8],
        timeout: Duration,
        what: &'static str,
    ) -> Result<usize, BusError> {
        let n = hal.bus_read(buf, timeout)?;
        if n == 0 {
            return Err(BusError::Timeout(what));
        }
        Ok(n)
    }

    /// Fill `buf` completely, accumulating across reads until the
    /// deadline. The HAL read only guarantees the first byte within its
    /// timeout, so a frame may arrive in several chunks.
    pub fn receive_exact<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        buf: &mut [u8],
        timeout: Duration,
        what: &'static str,
    ) -> Result<(), BusError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = hal.bus_read(&mut buf[filled..], remaining)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Err(BusError::Timeout(what));
        }
        if filled < buf.len() {
            return Err(BusError::BadReply(format!("short frame ({filled} bytes)")));
        }
        Ok(())
    }

    // ── Distance sensor ──

    /// Trigger one distance measurement and return millimetres.
    ///
    /// A reply carrying the range-error pattern is reported as
    /// [`BusError::OutOfRange`], never as a numeric distance.
    pub fn measure<H: RigHal + ?Sized>(&mut self, hal: &mut H) -> Result<f64, BusError> {
        self.switch_to(hal, BusOwner::Sensor)?;
        self.send(hal, &[MEASURE_TRIGGER])?;

        let mut frame = [0u8; 4];
        self.receive_exact(hal, &mut frame, self.read_timeout, "sensor frame")?;
        if frame[0] != FRAME_HEADER || frame[1] != FRAME_HEADER {
            return Err(BusError::BadReply(format!(
                "bad header {:02X}{:02X}",
                frame[0], frame[1]
            )));
        }
        if frame[2..4] == RANGE_ERROR {
            return Err(BusError::OutOfRange);
        }
        let mm = u16::from_le_bytes([frame[2], frame[3]]);
        Ok(mm as f64)
    }

    // ── Remote tilt actuator ──

    /// Command the remote tilt actuator to an angle.
    ///
    /// Sub-protocol: `ANGLE:<degrees with 2 decimals>\r\n` answered by
    /// `OK\r\n`. No acknowledgement within the fixed timeout is a
    /// reported failure, never retried automatically.
    pub fn set_remote_tilt<H: RigHal + ?Sized>(
        &mut self,
        hal: &mut H,
        degrees: f64,
    ) -> Result<(), BusError> {
        self.switch_to(hal, BusOwner::Actuator)?;
        let line = format!("ANGLE:{degrees:.2}\r\n");
        self.send(hal, line.as_bytes())?;

        let mut buf = [0u8; 8];
        let n = self.receive(hal, &mut buf, self.ack_timeout, "actuator ack")?;
        let reply = std::str::from_utf8(&buf[..n])
            .map_err(|_| BusError::BadReply("non-utf8 ack".into()))?;
        if reply.trim_end() != "OK" {
            return Err(BusError::BadReply(reply.trim_end().to_string()));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
