//! TX Priority Queue
//!
//! Unlike the FIFO queues, the Priority Queue is a set of 32 fixed slots
//! with no read or write position: each slot carries exactly one descriptor
//! through its own VALID lifecycle. Ring control bits have no meaning here,
//! so WRAP and END are rejected at claim time and the rolling counter is
//! pinned to 0 for every slot.

use crate::config::MhConfig;
use crate::descriptor::tx::{QueueBinding, TxDescriptor, TX_DESCRIPTOR_BYTES};
use crate::descriptor::{Crc9, MalformedDescriptor, TxStatus};
use crate::events::{Event, EventKind, QueueId, Statistics};
use crate::ownership::{DescriptorState, FetchError, NotFetched};
use crate::ring::ConfigurationWhileBusy;
use xcan_core::{EventSink, Memory};

/// Number of Priority Queue slots
pub const PRIORITY_SLOTS: usize = 32;

/// Why a Priority Queue slot claim was refused.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotClaimError {
    /// The slot still carries a valid, unconsumed descriptor
    AlreadyClaimed,
    /// WRAP and END are FIFO ring controls and illegal on fixed slots
    IllegalControlBits,
    /// Slot number out of range
    InvalidSlot,
    /// The queue is not started
    NotRunning,
}

/// A set of Priority Queue slot numbers, one bit per slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotSet(pub u32);

impl SlotSet {
    /// Whether `slot` is in the set.
    pub fn contains(&self, slot: u8) -> bool {
        slot < PRIORITY_SLOTS as u8 && self.0 & (1 << slot) != 0
    }

    /// Iterates over the slot numbers in the set, ascending.
    pub fn iter(&self) -> SlotSetIter {
        SlotSetIter { bits: self.0 }
    }
}

/// Iterator over the slots of a [`SlotSet`]
pub struct SlotSetIter {
    bits: u32,
}

impl Iterator for SlotSetIter {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.bits == 0 {
            return None;
        }
        let slot = self.bits.trailing_zeros() as u8;
        self.bits &= self.bits - 1;
        Some(slot)
    }
}

/// The TX Priority Queue.
pub struct TxPriorityQueue {
    instance: u8,
    crc: Option<Crc9>,
    start_address: u32,
    started: bool,
    stalled: bool,
    states: [DescriptorState; PRIORITY_SLOTS],
    in_flight: Option<(u8, TxDescriptor)>,
    stats: Statistics,
}

impl TxPriorityQueue {
    /// A Priority Queue under the instance-wide configuration `mh`.
    pub fn new(mh: &MhConfig) -> Self {
        Self {
            instance: mh.instance_number,
            crc: mh.tx_desc_crc.then(Crc9::default),
            start_address: 0,
            started: false,
            stalled: false,
            states: [DescriptorState::Free; PRIORITY_SLOTS],
            in_flight: None,
            stats: Statistics::default(),
        }
    }

    /// Sets the slot base address. Refused while the queue is started.
    pub fn configure(&mut self, start_address: u32) -> Result<(), ConfigurationWhileBusy> {
        if self.started {
            return Err(ConfigurationWhileBusy);
        }
        self.start_address = start_address;
        Ok(())
    }

    /// Starts the queue with all slots free.
    pub fn start(&mut self) {
        self.started = true;
        self.stalled = false;
        self.states = [DescriptorState::Free; PRIORITY_SLOTS];
        self.in_flight = None;
    }

    /// Takes the queue down.
    pub fn stop(&mut self) {
        self.started = false;
        self.stalled = false;
        self.in_flight = None;
    }

    fn slot_address(&self, slot: u8) -> u32 {
        self.start_address + slot as u32 * TX_DESCRIPTOR_BYTES as u32
    }

    /// Hands `descriptor` to the consumer in slot `slot`, stamping the
    /// hand-off fields. The rolling counter is forced to 0.
    pub fn claim<M: Memory>(
        &mut self,
        memory: &mut M,
        slot: u8,
        mut descriptor: TxDescriptor,
    ) -> Result<(), SlotClaimError> {
        if !self.started {
            return Err(SlotClaimError::NotRunning);
        }
        if slot as usize >= PRIORITY_SLOTS {
            return Err(SlotClaimError::InvalidSlot);
        }
        if descriptor.wrap || descriptor.end {
            return Err(SlotClaimError::IllegalControlBits);
        }
        self.states[slot as usize]
            .claim()
            .map_err(|_| SlotClaimError::AlreadyClaimed)?;
        descriptor.status = TxStatus::None;
        descriptor.binding = QueueBinding::Priority { slot };
        descriptor.rolling_counter = 0;
        descriptor.instance = self.instance;
        descriptor.valid = true;
        descriptor.crc = match &self.crc {
            Some(crc) => descriptor.compute_crc(crc),
            None => 0,
        };
        descriptor.write_to(memory, self.slot_address(slot));
        Ok(())
    }

    /// Consumer side: fetches the descriptor in slot `slot`. Validation
    /// failures stall the whole queue and raise a fetch-failure event.
    ///
    /// Blocks while the queue is stopped or stalled, or while a previous
    /// fetch has not been completed.
    pub fn fetch<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &M,
        slot: u8,
        sink: &mut S,
    ) -> nb::Result<TxDescriptor, FetchError> {
        if !self.started || self.stalled || self.in_flight.is_some() {
            return Err(nb::Error::WouldBlock);
        }
        if slot as usize >= PRIORITY_SLOTS {
            return Err(nb::Error::WouldBlock);
        }
        match self.validate(memory, slot) {
            Ok(descriptor) => {
                self.in_flight = Some((slot, descriptor));
                Ok(descriptor)
            }
            Err(error) => {
                self.stalled = true;
                sink.raise(Event {
                    queue: QueueId::TxPriority,
                    index: slot as u16,
                    kind: EventKind::FetchFailed(error),
                });
                Err(nb::Error::Other(error))
            }
        }
    }

    fn validate<M: Memory>(&mut self, memory: &M, slot: u8) -> Result<TxDescriptor, FetchError> {
        let descriptor = TxDescriptor::read_from(memory, self.slot_address(slot))
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
        match descriptor.binding {
            QueueBinding::Priority { slot: bound } if bound == slot => {}
            QueueBinding::Priority { slot: bound } => {
                return Err(FetchError::WrongQueue {
                    expected: slot,
                    observed: bound,
                })
            }
            // The PQ bit must be set in a Priority Queue descriptor.
            QueueBinding::Fifo { .. } => return Err(FetchError::Malformed),
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
        if descriptor.rolling_counter != 0 {
            return Err(FetchError::Sequence {
                expected: 0,
                observed: descriptor.rolling_counter,
            });
        }
        self.states[slot as usize].fetch()?;
        Ok(descriptor)
    }

    /// Consumer side: writes the outcome and timestamp back into the fetched
    /// slot and clears its VALID bit.
    pub fn complete<M: Memory, S: EventSink<Event>>(
        &mut self,
        memory: &mut M,
        status: TxStatus,
        timestamp: u64,
        sink: &mut S,
    ) -> Result<(), NotFetched> {
        let (slot, mut descriptor) = self.in_flight.take().ok_or(NotFetched)?;
        descriptor.status = status;
        descriptor.timestamp = timestamp;
        descriptor.valid = false;
        descriptor.write_to(memory, self.slot_address(slot));
        self.states[slot as usize].complete()?;
        self.stats.record_tx(status);
        if descriptor.irq {
            sink.raise(Event {
                queue: QueueId::TxPriority,
                index: slot as u16,
                kind: EventKind::TxCompleted { status },
            });
        }
        Ok(())
    }

    /// Software side: reads slot `slot` back, blocking while the consumer
    /// still owns it.
    pub fn read_back<M: Memory>(
        &self,
        memory: &M,
        slot: u8,
    ) -> nb::Result<TxDescriptor, MalformedDescriptor> {
        let descriptor = TxDescriptor::read_from(memory, self.slot_address(slot))
            .map_err(nb::Error::Other)?;
        if descriptor.valid {
            return Err(nb::Error::WouldBlock);
        }
        Ok(descriptor)
    }

    /// Snapshot of the slots whose descriptors carry VALID. TX-Scan builds
    /// its candidate report from this.
    pub fn pending_slots<M: Memory>(&self, memory: &M) -> SlotSet {
        let mut bits = 0;
        if !self.started || self.stalled || self.in_flight.is_some() {
            return SlotSet(bits);
        }
        for slot in 0..PRIORITY_SLOTS as u8 {
            if memory.read_word(self.slot_address(slot)) & (1 << 31) != 0 {
                bits |= 1 << slot;
            }
        }
        SlotSet(bits)
    }

    /// Message counters.
    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    /// Whether a fetch error froze the queue.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tx::TxPayload;
    use crate::message::{ClassicHeader, Header};
    use embedded_can::{Id, StandardId};
    use std::vec::Vec;

    struct Ram([u32; 512]);

    impl Memory for Ram {
        fn read_word(&self, address: u32) -> u32 {
            self.0[(address / 4) as usize]
        }
        fn write_word(&mut self, address: u32, word: u32) {
            self.0[(address / 4) as usize] = word;
        }
    }

    fn descriptor() -> TxDescriptor {
        TxDescriptor::new(
            Header::Classic(ClassicHeader {
                id: Id::Standard(StandardId::new(0x55).unwrap()),
                dlc: 2,
                remote: false,
                fault_injection: false,
            }),
            TxPayload::Inline { td0: 0xabcd, td1: 0 },
        )
    }

    fn queue() -> TxPriorityQueue {
        let mut q = TxPriorityQueue::new(&MhConfig::default());
        q.configure(0).unwrap();
        q.start();
        q
    }

    #[test]
    fn slot_lifecycle() {
        let mut ram = Ram([0; 512]);
        let mut events = Vec::new();
        let mut sink = |e| events.push(e);
        let mut q = queue();

        q.claim(&mut ram, 7, descriptor()).unwrap();
        assert_eq!(q.read_back(&ram, 7), Err(nb::Error::WouldBlock));

        let fetched = q.fetch(&ram, 7, &mut sink).unwrap();
        assert_eq!(fetched.rolling_counter, 0);
        assert_eq!(fetched.binding, QueueBinding::Priority { slot: 7 });

        q.complete(&mut ram, TxStatus::MessageSentSuccess, 42, &mut sink)
            .unwrap();
        let back = q.read_back(&ram, 7).unwrap();
        assert_eq!(back.status, TxStatus::MessageSentSuccess);
        assert_eq!(back.timestamp, 42);

        // The slot is reusable after completion.
        q.claim(&mut ram, 7, descriptor()).unwrap();
    }

    #[test]
    fn ring_control_bits_are_illegal() {
        let mut ram = Ram([0; 512]);
        let mut q = queue();
        let mut d = descriptor();
        d.wrap = true;
        assert_eq!(
            q.claim(&mut ram, 0, d),
            Err(SlotClaimError::IllegalControlBits)
        );
        let mut d = descriptor();
        d.end = true;
        assert_eq!(
            q.claim(&mut ram, 0, d),
            Err(SlotClaimError::IllegalControlBits)
        );
    }

    #[test]
    fn double_claim_is_refused() {
        let mut ram = Ram([0; 512]);
        let mut q = queue();
        q.claim(&mut ram, 3, descriptor()).unwrap();
        assert_eq!(
            q.claim(&mut ram, 3, descriptor()),
            Err(SlotClaimError::AlreadyClaimed)
        );
    }

    #[test]
    fn nonzero_rolling_counter_is_a_sequence_error() {
        let mut ram = Ram([0; 512]);
        let mut events = Vec::new();
        let mut sink = |e| events.push(e);
        let mut q = queue();

        q.claim(&mut ram, 0, descriptor()).unwrap();
        // Stamp a nonzero RC directly into the slot.
        ram.0[0] |= 5 << 4;
        assert_eq!(
            q.fetch(&ram, 0, &mut sink),
            Err(nb::Error::Other(FetchError::Sequence {
                expected: 0,
                observed: 5,
            }))
        );
        assert!(q.is_stalled());
        assert_eq!(q.fetch(&ram, 0, &mut sink), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn pending_slots_snapshot() {
        let mut ram = Ram([0; 512]);
        let mut q = queue();
        q.claim(&mut ram, 0, descriptor()).unwrap();
        q.claim(&mut ram, 13, descriptor()).unwrap();
        q.claim(&mut ram, 31, descriptor()).unwrap();

        let set = q.pending_slots(&ram);
        assert!(set.contains(0) && set.contains(13) && set.contains(31));
        assert!(!set.contains(1));
        let slots: Vec<u8> = set.iter().collect();
        assert_eq!(slots, [0, 13, 31]);
    }

    #[test]
    fn out_of_range_slot_is_refused() {
        let mut ram = Ram([0; 512]);
        let mut q = queue();
        assert_eq!(
            q.claim(&mut ram, 32, descriptor()),
            Err(SlotClaimError::InvalidSlot)
        );
    }
}
