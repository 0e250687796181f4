//! RX FIFO queues
//!
//! An RX FIFO queue pairs a descriptor ring with a data container. Software
//! arms descriptors at the write side; the Message Handler consumes them in
//! rolling-counter order as messages arrive, writes the frame header and
//! payload into the container and hands the descriptor back with the
//! outcome.
//!
//! In Normal mode every descriptor carries its own container slice address
//! and a message may span several descriptors, linked by the NEXT bit on the
//! header descriptor. In Continuous mode the queue owns one shared container:
//! the Message Handler allocates space behind a read pointer software
//! advances as it consumes data, and writes the allocated address back into
//! the descriptor. A message that does not fit is dropped and reported, the
//! queue keeps running.

use crate::config::{MhConfig, RxFifoConfig, RxMode};
use crate::descriptor::rx::{RxDescriptor, RX_DESCRIPTOR_BYTES};
use crate::descriptor::{Crc9, MalformedDescriptor, RxStatus};
use crate::events::{Event, EventKind, QueueId, Statistics};
use crate::message::Header;
use crate::ownership::{FetchError, RollingCounter};
use crate::ring::{
    ConfigurationWhileBusy, DescriptorConfigurationError, NotRunning, QueueRing, RingState,
};
use xcan_core::{EventSink, Memory};

/// Why a received message could not be stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A descriptor fetch failed; the queue is stalled
    Fetch(FetchError),
    /// Continuous mode: the message did not fit into the data container and
    /// was dropped; the queue keeps running
    Overflow {
        /// Bytes the message needed, including wrap padding
        needed: u32,
        /// Bytes free in the container
        available: u32,
    },
}

/// The read-pointer address lies outside the queue's data container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadPointerOutOfRange;

/// One of the 8 RX FIFO queues.
pub struct RxFifoQueue {
    queue: u8,
    instance: u8,
    crc: Option<Crc9>,
    ring: QueueRing,
    mode: RxMode,
    dc_start: u32,
    dc_size: u32,
    arm_index: u16,
    arm_rc: RollingCounter,
    fetch_rc: RollingCounter,
    pop_index: u16,
    write_offset: u32,
    used_bytes: u32,
    read_pointer: u32,
    stats: Statistics,
}

impl RxFifoQueue {
    /// RX FIFO queue `queue` under the instance-wide configuration `mh`.
    pub fn new(queue: u8, mh: &MhConfig) -> Self {
        Self {
            queue,
            instance: mh.instance_number,
            crc: mh.rx_desc_crc.then(Crc9::default),
            ring: QueueRing::new(RX_DESCRIPTOR_BYTES as u32),
            mode: RxMode::Normal,
            dc_start: 0,
            dc_size: 0,
            arm_index: 0,
            arm_rc: RollingCounter::new(),
            fetch_rc: RollingCounter::new(),
            pop_index: 0,
            write_offset: 0,
            used_bytes: 0,
            read_pointer: 0,
            stats: Statistics::default(),
        }
    }

    /// Sets the ring and container geometry. Refused while the queue is busy.
    pub fn configure(&mut self, config: RxFifoConfig) -> Result<(), ConfigurationWhileBusy> {
        self.ring
            .configure(config.start_address, config.max_desc)?;
        self.mode = config.mode;
        self.dc_start = config.dc_start_address;
        self.dc_size = config.dc_size;
        Ok(())
    }

    /// Starts the queue at slot 0 with both rolling counters at 0. The
    /// Continuous-mode read pointer comes up with its never-advanced
    /// sentinel (low bits `0b11`), which reads as an empty container, not a
    /// full one.
    ///
    /// The container geometry is validated here like the slot count: a
    /// Normal-mode slice must at least hold the two frame header words, and
    /// a Continuous-mode container must not be empty.
    pub fn start(&mut self) -> Result<(), DescriptorConfigurationError> {
        match self.mode {
            RxMode::Normal if self.dc_size < 8 => return Err(DescriptorConfigurationError),
            RxMode::Continuous if self.dc_size == 0 => return Err(DescriptorConfigurationError),
            _ => {}
        }
        self.ring.start()?;
        self.arm_index = 0;
        self.arm_rc = RollingCounter::new();
        self.fetch_rc = RollingCounter::new();
        self.pop_index = 0;
        self.write_offset = 0;
        self.used_bytes = 0;
        self.read_pointer = self.dc_start | 0b11;
        Ok(())
    }

    /// Takes the queue down. Required after a stall before reconfiguring.
    pub fn stop(&mut self) {
        self.ring.stop();
    }

    /// Software side: arms the next write-side descriptor for reception,
    /// stamping the hand-off fields. `data_address` is the descriptor's
    /// container slice in Normal mode and ignored in Continuous mode. Returns
    /// the slot index.
    ///
    /// Blocks while the target slot still carries VALID.
    pub fn arm<M: Memory>(
        &mut self,
        memory: &mut M,
        data_address: u32,
        irq: bool,
    ) -> nb::Result<u16, NotRunning> {
        if self.ring.state() != RingState::Running {
            return Err(nb::Error::Other(NotRunning));
        }
        let index = self.arm_index;
        let address = self.ring.slot_address(index);
        if memory.read_word(address) & (1 << 31) != 0 {
            // VALID still set: the slot is owned by the consumer.
            return Err(nb::Error::WouldBlock);
        }
        let mut descriptor = RxDescriptor::new(self.queue);
        descriptor.rolling_counter = self.arm_rc.advance();
        descriptor.instance = self.instance;
        descriptor.irq = irq;
        descriptor.valid = true;
        descriptor.data_address = match self.mode {
            RxMode::Normal => data_address,
            RxMode::Continuous => 0,
        };
        descriptor.crc = match &self.crc {
            Some(crc) => descriptor.compute_crc(crc),
            None => 0,
        };
        descriptor.write_to(memory, address);
        self.arm_index = (index + 1) % self.ring.max_desc();
        Ok(index)
    }

    /// Consumer side: stores one received message, consuming one descriptor
    /// per container slice it spans (Normal mode) or exactly one descriptor
    /// (Continuous mode). The frame header words are written ahead of the
    /// payload in the container, which is how software learns the message
    /// shape.
    pub fn store_message<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &mut M,
        header: Header,
        payload: &[u8],
        timestamp: u64,
        sink: &mut S,
    ) -> Result<(), StoreError> {
        if self.ring.state() != RingState::Running {
            return Err(StoreError::Fetch(FetchError::UnvalidDescriptorFetched));
        }
        let needed = round_up_words(8 + payload.len() as u32);
        match self.mode {
            RxMode::Normal => self.store_normal(memory, header, payload, needed, timestamp, sink),
            RxMode::Continuous => {
                self.store_continuous(memory, header, payload, needed, timestamp, sink)
            }
        }
    }

    fn store_normal<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &mut M,
        header: Header,
        payload: &[u8],
        needed: u32,
        timestamp: u64,
        sink: &mut S,
    ) -> Result<(), StoreError> {
        let span = needed.div_ceil(self.dc_size).max(1) as u16;
        let head_index = self.ring.index();
        let mut head = self.fetch(memory, sink)?;
        self.advance();
        let (r0, r1) = header.to_words();
        memory.write_words(head.data_address, &[r0, r1]);
        let head_capacity = (self.dc_size - 8) as usize;
        let (first, mut rest) = payload.split_at(payload.len().min(head_capacity));
        write_bytes(memory, head.data_address + 8, first);

        // Trailing descriptors are written back as they fill; ownership of
        // the whole message resolves with the header descriptor, so VALID is
        // cleared on the header alone, and last.
        for _ in 1..span {
            let index = self.ring.index();
            let mut trailing = self.fetch(memory, sink)?;
            let (chunk, remainder) = rest.split_at(rest.len().min(self.dc_size as usize));
            write_bytes(memory, trailing.data_address, chunk);
            rest = remainder;
            trailing.status = RxStatus::MessageReceiveSuccess;
            trailing.header_descriptor = false;
            trailing.next = false;
            trailing.timestamp = timestamp;
            trailing.write_to(memory, self.ring.slot_address(index));
            self.advance();
        }

        head.status = RxStatus::MessageReceiveSuccess;
        head.header_descriptor = true;
        head.next = span > 1;
        head.timestamp = timestamp;
        head.valid = false;
        head.write_to(memory, self.ring.slot_address(head_index));
        self.finish(head, head_index, sink);
        Ok(())
    }

    fn store_continuous<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &mut M,
        header: Header,
        payload: &[u8],
        needed: u32,
        timestamp: u64,
        sink: &mut S,
    ) -> Result<(), StoreError> {
        let address = match self.allocate(needed) {
            Ok(address) => address,
            Err(available) => {
                sink.raise(Event {
                    queue: QueueId::RxFifo(self.queue),
                    index: self.ring.index(),
                    kind: EventKind::ContainerOverflow { needed, available },
                });
                return Err(StoreError::Overflow { needed, available });
            }
        };
        let index = self.ring.index();
        let mut descriptor = self.fetch(memory, sink)?;
        self.advance();
        let (r0, r1) = header.to_words();
        memory.write_words(address, &[r0, r1]);
        write_bytes(memory, address + 8, payload);
        descriptor.status = RxStatus::MessageReceiveSuccess;
        descriptor.header_descriptor = true;
        descriptor.next = false;
        descriptor.data_address = address;
        descriptor.timestamp = timestamp;
        descriptor.valid = false;
        descriptor.write_to(memory, self.ring.slot_address(index));
        self.finish(descriptor, index, sink);
        Ok(())
    }

    fn fetch<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &M,
        sink: &mut S,
    ) -> Result<RxDescriptor, StoreError> {
        let index = self.ring.index();
        match self.validate(memory) {
            Ok(descriptor) => Ok(descriptor),
            Err(error) => {
                self.ring.stall();
                sink.raise(Event {
                    queue: QueueId::RxFifo(self.queue),
                    index,
                    kind: EventKind::FetchFailed(error),
                });
                Err(StoreError::Fetch(error))
            }
        }
    }

    fn validate<M: Memory>(&mut self, memory: &M) -> Result<RxDescriptor, FetchError> {
        let descriptor = RxDescriptor::read_from(memory, self.ring.current_address())
            .map_err(|_| FetchError::Malformed)?;
        if !descriptor.valid {
            return Err(FetchError::UnvalidDescriptorFetched);
        }
        if descriptor.instance != self.instance {
            return Err(FetchError::WrongInstance {
                expected: self.instance,
                observed: descriptor.instance,
            });
        }
        if descriptor.queue != self.queue {
            return Err(FetchError::WrongQueue {
                expected: self.queue,
                observed: descriptor.queue,
            });
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

    fn advance(&mut self) {
        // RX descriptors carry no WRAP bit; the ring is implicitly circular.
        let wrap = self.ring.index() + 1 >= self.ring.max_desc();
        self.ring.advance(wrap);
    }

    fn finish<S: EventSink<Event>>(&mut self, head: RxDescriptor, index: u16, sink: &mut S) {
        self.stats.record_rx(head.status);
        if head.irq {
            sink.raise(Event {
                queue: QueueId::RxFifo(self.queue),
                index,
                kind: EventKind::RxCompleted {
                    status: head.status,
                    message_address: head.data_address,
                },
            });
        }
    }

    fn allocate(&mut self, needed: u32) -> Result<u32, u32> {
        // A message is stored contiguously; running past the container end
        // wastes the tail as padding, which counts as used space until the
        // read pointer passes it.
        let pad = if self.write_offset + needed > self.dc_size {
            self.dc_size - self.write_offset
        } else {
            0
        };
        let available = self.dc_size - self.used_bytes;
        if pad + needed > available {
            return Err(available);
        }
        self.used_bytes += pad + needed;
        if pad > 0 {
            self.write_offset = 0;
        }
        let address = self.dc_start + self.write_offset;
        self.write_offset = (self.write_offset + needed) % self.dc_size;
        Ok(address)
    }

    /// Software side: frees Continuous-mode container space up to `address`,
    /// exclusive. Mirrors the read-pointer register the Message Handler
    /// checks before allocating. Refuses an address outside the container;
    /// the container end aliases its start.
    ///
    /// Advance the pointer once per consumed message. A single advance frees
    /// the distance from the old position to the new one, so moving the
    /// pointer a full lap in one call frees nothing.
    pub fn advance_read_pointer(&mut self, address: u32) -> Result<(), ReadPointerOutOfRange> {
        let aligned = address & !0b11;
        if self.dc_size == 0 || aligned < self.dc_start || aligned > self.dc_start + self.dc_size
        {
            return Err(ReadPointerOutOfRange);
        }
        let old = if self.read_pointer & 0b11 == 0b11 {
            0
        } else {
            self.read_pointer - self.dc_start
        };
        let new = (aligned - self.dc_start) % self.dc_size;
        let consumed = if new >= old {
            new - old
        } else {
            self.dc_size - old + new
        };
        self.used_bytes = self.used_bytes.saturating_sub(consumed);
        self.read_pointer = self.dc_start + new;
        Ok(())
    }

    /// Current read-pointer register value, sentinel bits included.
    pub fn read_pointer(&self) -> u32 {
        self.read_pointer
    }

    /// Software side: takes the next completed message descriptor off the
    /// queue, stepping over the trailing descriptors of a multi-descriptor
    /// message. Blocks while the next slot is armed but not yet filled, or
    /// not armed at all.
    pub fn pop<M: Memory>(&mut self, memory: &M) -> nb::Result<RxDescriptor, MalformedDescriptor> {
        let descriptor = RxDescriptor::read_from(memory, self.ring.slot_address(self.pop_index))
            .map_err(nb::Error::Other)?;
        if descriptor.valid || descriptor.status == RxStatus::None {
            return Err(nb::Error::WouldBlock);
        }
        let span = match self.mode {
            RxMode::Normal => {
                let needed = round_up_words(8 + self.message_len(memory, &descriptor) as u32);
                needed.div_ceil(self.dc_size).max(1) as u16
            }
            RxMode::Continuous => 1,
        };
        self.pop_index = (self.pop_index + span) % self.ring.max_desc();
        Ok(descriptor)
    }

    /// Frame header stored ahead of the payload in the container.
    pub fn message_header<M: Memory>(&self, memory: &M, descriptor: &RxDescriptor) -> Header {
        let mut words = [0; 2];
        memory.read_words(descriptor.data_address, &mut words);
        Header::from_words(words[0], words[1])
    }

    fn message_len<M: Memory>(&self, memory: &M, descriptor: &RxDescriptor) -> usize {
        self.message_header(memory, descriptor).payload_len()
    }

    /// Queue number.
    pub fn queue_number(&self) -> u8 {
        self.queue
    }

    /// Read-side run state.
    pub fn state(&self) -> RingState {
        self.ring.state()
    }

    /// Message counters.
    pub fn statistics(&self) -> Statistics {
        self.stats
    }
}

fn round_up_words(bytes: u32) -> u32 {
    (bytes + 3) & !3
}

fn write_bytes<M: Memory>(memory: &mut M, mut address: u32, bytes: &[u8]) {
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        memory.write_word(address, u32::from_le_bytes(word));
        address += 4;
    }
}
