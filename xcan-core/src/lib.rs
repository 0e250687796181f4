#![no_std]
#![warn(missing_docs)]

//! `xcan-core` provides a set of essential abstractions that serve as a thin
//! integration layer between the platform independent [`xcan`] crate and
//! platform specific code (in documentation also referred to as _target
//! integrations_).
//!
//! The X_CAN Message Handler does not drive the CAN wire itself and does not
//! own the system address space it places descriptors in. Both are supplied by
//! the platform:
//!
//! - [`ProtocolController`] stands in for the PRT, the bus-level CAN engine
//!   consuming frames selected by the Message Handler and producing received
//!   ones.
//! - [`Memory`] is the generic 32-bit address-space access capability used to
//!   move encoded descriptors in and out of system memory.
//! - [`EventSink`] is where the Message Handler reports its structured events;
//!   on real hardware this is the interrupt controller's raw/enable/clear
//!   register file, which is out of scope here.
//!
//! Traits from this crate are not supposed to be implemented by the
//! application developer; implementations should be provided by target
//! integrations.
//!
//! [`xcan`]: <https://docs.rs/crate/xcan/>

/// Generic 32-bit address-space access.
///
/// The Message Handler assumes word-aligned, little-endian system memory.
/// Addresses passed to these methods are full 32-bit byte addresses; callers
/// guarantee word alignment.
pub trait Memory {
    /// Reads the 32-bit word at `address`.
    fn read_word(&self, address: u32) -> u32;

    /// Writes the 32-bit word at `address`.
    fn write_word(&mut self, address: u32, word: u32);

    /// Reads consecutive words starting at `address` into `buffer`.
    fn read_words(&self, address: u32, buffer: &mut [u32]) {
        for (i, word) in buffer.iter_mut().enumerate() {
            *word = self.read_word(address.wrapping_add(4 * i as u32));
        }
    }

    /// Writes consecutive words from `buffer` starting at `address`.
    fn write_words(&mut self, address: u32, buffer: &[u32]) {
        for (i, word) in buffer.iter().enumerate() {
            self.write_word(address.wrapping_add(4 * i as u32), *word);
        }
    }
}

/// Sink for structured events raised by the Message Handler.
///
/// The event type is supplied by the caller; `xcan` delivers its
/// `events::Event`. A sink must not block; on real hardware the equivalent
/// operation is setting a raw interrupt status bit.
pub trait EventSink<E> {
    /// Delivers one event to the sink.
    fn raise(&mut self, event: E);
}

impl<E, F: FnMut(E)> EventSink<E> for F {
    fn raise(&mut self, event: E) {
        self(event)
    }
}

/// Frame format capabilities requested from the protocol controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Modes {
    /// CAN FD frames may be exchanged.
    pub fd: bool,
    /// CAN XL frames may be exchanged.
    pub xl: bool,
    /// Receive-only; no dominant bits are driven on the bus.
    pub listen_only: bool,
    /// Transmission restricted to error signalling.
    pub restricted: bool,
}

/// Transmit and receive error counters as maintained by the protocol
/// controller's fault confinement rules.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Transmit error counter.
    pub transmit: u8,
    /// Receive error counter.
    pub receive: u8,
}

/// Outcome of a single frame exchange on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireOutcome {
    /// The frame was acknowledged
    Sent,
    /// Arbitration was lost or errors exhausted the retry budget
    NotSent,
    /// Acknowledge data carried a parity error
    AckWithError,
}

/// The protocol controller (PRT) as seen by the Message Handler.
///
/// Bit timing, fault confinement state transitions and the transceiver coding
/// are internal to the implementation; the Message Handler only needs to
/// start and stop the controller, select frame format capabilities and read
/// the error counters back.
pub trait ProtocolController {
    /// Controller specific error type.
    type Error;

    /// Starts CAN communication with the given mode selection.
    fn start(&mut self, modes: Modes) -> Result<(), Self::Error>;

    /// Requests a stop. The controller finishes or aborts the frame in
    /// progress; [`ProtocolController::is_running`] reports the outcome.
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// `true` while the controller takes part in bus communication.
    fn is_running(&self) -> bool;

    /// Hands one frame over for transmission: the two raw header words as
    /// they appear in the descriptor, followed by the payload words. Resolves
    /// with the wire outcome the Message Handler writes back into the
    /// originating descriptor.
    fn transmit(&mut self, t0: u32, t1: u32, payload: &[u32]) -> Result<WireOutcome, Self::Error>;

    /// Current transmit/receive error counter values.
    fn error_counters(&self) -> ErrorCounters;
}
