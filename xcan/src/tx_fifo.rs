//! TX FIFO queues
//!
//! A TX FIFO queue is a descriptor ring claimed by software at the write
//! side and consumed in strict rolling-counter order at the read side. The
//! WRAP bit of a claimed descriptor keeps the ring circular; END closes the
//! queue after the descriptor carrying it completes. Any fetch-side
//! validation failure stalls the queue until software stops and
//! reconfigures it.

use crate::config::{MhConfig, TxFifoConfig};
use crate::descriptor::tx::{QueueBinding, TxDescriptor, TX_DESCRIPTOR_BYTES};
use crate::descriptor::{Crc9, MalformedDescriptor, TxStatus};
use crate::events::{Event, EventKind, QueueId, Statistics};
use crate::ownership::{FetchError, NotFetched, RollingCounter};
use crate::ring::{
    ConfigurationWhileBusy, DescriptorConfigurationError, NotRunning, QueueRing, RingState,
};
use xcan_core::{EventSink, Memory};

/// A descriptor fetched but not yet completed.
#[derive(Copy, Clone, Debug)]
struct InFlight {
    index: u16,
    descriptor: TxDescriptor,
}

/// One of the 8 TX FIFO queues.
pub struct TxFifoQueue {
    queue: u8,
    instance: u8,
    crc: Option<Crc9>,
    ring: QueueRing,
    claim_index: u16,
    claim_open: bool,
    claim_rc: RollingCounter,
    claimed: u16,
    fetch_rc: RollingCounter,
    in_flight: Option<InFlight>,
    stats: Statistics,
}

impl TxFifoQueue {
    /// TX FIFO queue `queue` under the instance-wide configuration `mh`.
    pub fn new(queue: u8, mh: &MhConfig) -> Self {
        Self {
            queue,
            instance: mh.instance_number,
            crc: mh.tx_desc_crc.then(Crc9::default),
            ring: QueueRing::new(TX_DESCRIPTOR_BYTES as u32),
            claim_index: 0,
            claim_open: false,
            claim_rc: RollingCounter::new(),
            claimed: 0,
            fetch_rc: RollingCounter::new(),
            in_flight: None,
            stats: Statistics::default(),
        }
    }

    /// Sets the ring geometry. Refused while the queue is busy.
    pub fn configure(&mut self, config: TxFifoConfig) -> Result<(), ConfigurationWhileBusy> {
        self.ring.configure(config.start_address, config.max_desc)
    }

    /// Starts the queue at slot 0 with both rolling counters at 0.
    pub fn start(&mut self) -> Result<(), DescriptorConfigurationError> {
        self.ring.start()?;
        self.claim_index = 0;
        self.claim_open = true;
        self.claim_rc = RollingCounter::new();
        self.claimed = 0;
        self.fetch_rc = RollingCounter::new();
        self.in_flight = None;
        Ok(())
    }

    /// Takes the queue down. Required after a stall before reconfiguring.
    pub fn stop(&mut self) {
        self.ring.stop();
        self.claim_open = false;
        self.in_flight = None;
    }

    /// Hands `descriptor` to the consumer in the next write-side slot,
    /// stamping the hand-off fields (queue binding, rolling counter,
    /// instance number, CRC, VALID) on the way out. Returns the slot index.
    ///
    /// Blocks (`WouldBlock`) while the target slot still carries VALID,
    /// which means the consumer has not caught up and the ring is full.
    pub fn claim<M: Memory>(
        &mut self,
        memory: &mut M,
        mut descriptor: TxDescriptor,
    ) -> nb::Result<u16, NotRunning> {
        if self.ring.state() != RingState::Running || !self.claim_open {
            return Err(nb::Error::Other(NotRunning));
        }
        let index = self.claim_index;
        let address = self.ring.slot_address(index);
        if memory.read_word(address) & (1 << 31) != 0 {
            // VALID still set: the slot is owned by the consumer.
            return Err(nb::Error::WouldBlock);
        }
        descriptor.status = TxStatus::None;
        descriptor.binding = QueueBinding::Fifo { queue: self.queue };
        descriptor.rolling_counter = self.claim_rc.advance();
        descriptor.instance = self.instance;
        descriptor.valid = true;
        descriptor.crc = match &self.crc {
            Some(crc) => descriptor.compute_crc(crc),
            None => 0,
        };
        descriptor.write_to(memory, address);
        self.claimed += 1;
        if descriptor.end || (!descriptor.wrap && index + 1 >= self.ring.max_desc()) {
            self.claim_open = false;
        } else if descriptor.wrap {
            self.claim_index = 0;
        } else {
            self.claim_index = index + 1;
        }
        Ok(index)
    }

    /// Consumer side: fetches the descriptor at the current read position,
    /// validating ownership, instance, queue binding, CRC and the rolling
    /// counter. Any validation failure stalls the queue, raises a
    /// [`EventKind::FetchFailed`] event and never yields the contents.
    ///
    /// Blocks while the queue is not running or a previous fetch has not
    /// been completed yet.
    pub fn fetch<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &M,
        sink: &mut S,
    ) -> nb::Result<TxDescriptor, FetchError> {
        if self.ring.state() != RingState::Running || self.in_flight.is_some() {
            return Err(nb::Error::WouldBlock);
        }
        let index = self.ring.index();
        match self.validate(memory, self.ring.current_address()) {
            Ok(descriptor) => {
                self.in_flight = Some(InFlight { index, descriptor });
                Ok(descriptor)
            }
            Err(error) => {
                self.ring.stall();
                sink.raise(Event {
                    queue: QueueId::TxFifo(self.queue),
                    index,
                    kind: EventKind::FetchFailed(error),
                });
                Err(nb::Error::Other(error))
            }
        }
    }

    fn validate<M: Memory>(
        &mut self,
        memory: &M,
        address: u32,
    ) -> Result<TxDescriptor, FetchError> {
        let descriptor =
            TxDescriptor::read_from(memory, address).map_err(|_| FetchError::Malformed)?;
        if !descriptor.valid {
            return Err(FetchError::UnvalidDescriptorFetched);
        }
        if descriptor.instance != self.instance {
            return Err(FetchError::WrongInstance {
                expected: self.instance,
                observed: descriptor.instance,
            });
        }
        match descriptor.binding {
            QueueBinding::Fifo { queue } if queue == self.queue => {}
            QueueBinding::Fifo { queue } => {
                return Err(FetchError::WrongQueue {
                    expected: self.queue,
                    observed: queue,
                })
            }
            // The PQ bit must be clear in a FIFO descriptor.
            QueueBinding::Priority { .. } => return Err(FetchError::Malformed),
        }
        if let Some(crc) = &self.crc {
            let expected = descriptor.compute_crc(crc);
            if descriptor.crc != expected {
                return Err(FetchError::Crc {
                    expected,
                    observed: descriptor.crc,
                });
            }
        }
        self.fetch_rc.check(descriptor.rolling_counter)?;
        Ok(descriptor)
    }

    /// Consumer side: writes the outcome and timestamp back into the fetched
    /// descriptor, clears VALID on header descriptors and moves the read
    /// position along the ring as the descriptor's WRAP/END bits dictate.
    pub fn complete<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &mut M,
        status: TxStatus,
        timestamp: u64,
        sink: &mut S,
    ) -> Result<(), NotFetched> {
        let InFlight {
            index,
            mut descriptor,
        } = self.in_flight.take().ok_or(NotFetched)?;
        descriptor.status = status;
        descriptor.timestamp = timestamp;
        if descriptor.header_descriptor {
            descriptor.valid = false;
        }
        descriptor.write_to(memory, self.ring.slot_address(index));
        self.claimed = self.claimed.saturating_sub(1);
        self.stats.record_tx(status);
        if descriptor.irq {
            sink.raise(Event {
                queue: QueueId::TxFifo(self.queue),
                index,
                kind: EventKind::TxCompleted { status },
            });
        }
        if descriptor.end {
            self.ring.end();
        } else {
            self.ring.advance(descriptor.wrap);
        }
        if self.ring.state() == RingState::Ended {
            sink.raise(Event {
                queue: QueueId::TxFifo(self.queue),
                index,
                kind: EventKind::Ended,
            });
        }
        Ok(())
    }

    /// Software side: reads slot `index` back, blocking while the consumer
    /// still owns it (VALID set).
    pub fn read_back<M: Memory>(
        &self,
        memory: &M,
        index: u16,
    ) -> nb::Result<TxDescriptor, MalformedDescriptor> {
        let descriptor = TxDescriptor::read_from(memory, self.ring.slot_address(index))
            .map_err(nb::Error::Other)?;
        if descriptor.valid {
            return Err(nb::Error::WouldBlock);
        }
        Ok(descriptor)
    }

    /// Whether the descriptor `offset` slots past the current read position
    /// carries VALID, without consuming anything. TX-Scan builds its
    /// candidate report from this.
    ///
    /// An offset past the span of claimed-but-unconsumed slots reports
    /// false even when the wrapped-around slot carries VALID: that slot is
    /// already reachable at a lower offset.
    pub fn pending_at<M: Memory>(&self, memory: &M, offset: u16) -> bool {
        if self.ring.state() != RingState::Running || self.in_flight.is_some() {
            return false;
        }
        if offset >= self.claimed {
            return false;
        }
        let index = (self.ring.index() + offset) % self.ring.max_desc();
        memory.read_word(self.ring.slot_address(index)) & (1 << 31) != 0 // VALID
    }

    /// Queue number.
    pub fn queue_number(&self) -> u8 {
        self.queue
    }

    /// Read-side run state.
    pub fn state(&self) -> RingState {
        self.ring.state()
    }

    /// Current read-side slot index.
    pub fn fetch_index(&self) -> u16 {
        self.ring.index()
    }

    /// Address the next fetch will use. Read-only view of the live pointer.
    pub fn fetch_address(&self) -> u32 {
        self.ring.current_address()
    }

    /// Message counters.
    pub fn statistics(&self) -> Statistics {
        self.stats
    }
}
