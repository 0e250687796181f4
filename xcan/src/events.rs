//! Structured queue events
//!
//! The Message Handler reports everything of interest as a value pushed into
//! an [`xcan_core::EventSink`]: completions of descriptors armed with IRQ,
//! fetch errors that stalled a queue, and lost messages in Continuous mode.
//! Integrations route these to their interrupt handling or logging; the
//! queues themselves never print or panic.

use crate::descriptor::{RxStatus, TxStatus};
use crate::ownership::FetchError;

/// Which queue an event refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueId {
    /// TX FIFO queue 0..=7
    TxFifo(u8),
    /// The TX Priority Queue (the slot number is carried as the event index)
    TxPriority,
    /// RX FIFO queue 0..=7
    RxFifo(u8),
}

/// What happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A descriptor fetch was refused and the queue stalled
    FetchFailed(FetchError),
    /// A TX descriptor with IRQ set completed
    TxCompleted {
        /// Outcome written back into the descriptor
        status: TxStatus,
    },
    /// An RX descriptor with IRQ set completed
    RxCompleted {
        /// Outcome written back into the descriptor
        status: RxStatus,
        /// Address of the received message data in the data container
        message_address: u32,
    },
    /// A Continuous-mode message did not fit into the data container and was
    /// dropped; the queue keeps running
    ContainerOverflow {
        /// Bytes the message needed
        needed: u32,
        /// Bytes available between write offset and read pointer
        available: u32,
    },
    /// The queue consumed a descriptor with END set and stopped
    Ended,
}

/// One reported event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Queue the event originates from
    pub queue: QueueId,
    /// Descriptor slot index (Priority Queue slot number for
    /// [`QueueId::TxPriority`])
    pub index: u16,
    /// Event payload
    pub kind: EventKind,
}

/// Per-queue message counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Messages completed with a success status
    pub successful: u32,
    /// Messages completed with any other status
    pub unsuccessful: u32,
}

impl Statistics {
    pub(crate) fn record_tx(&mut self, status: TxStatus) {
        if let TxStatus::MessageSentSuccess = status {
            self.successful += 1;
        } else {
            self.unsuccessful += 1;
        }
    }

    pub(crate) fn record_rx(&mut self, status: RxStatus) {
        if let RxStatus::MessageReceiveSuccess = status {
            self.successful += 1;
        } else {
            self.unsuccessful += 1;
        }
    }
}
