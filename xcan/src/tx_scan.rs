//! TX-Scan candidate arbitration
//!
//! Before a transmission the Message Handler scans the Priority Queue slots
//! and the TX FIFO heads for descriptors carrying VALID and ranks them. The
//! report holds up to four candidates: the first pair is what goes on the
//! bus next, the second pair is the best remainder assuming the first pair
//! completes. Selecting a FIFO head exposes that queue's next descriptor,
//! so one queue can occupy several report entries.
//!
//! The ranking policy is injectable; hardware revisions differ on how a
//! Priority Queue slot and a FIFO head of equal urgency are ordered, and
//! the scan itself does not care.

use crate::tx_fifo::TxFifoQueue;
use crate::tx_priority::{TxPriorityQueue, PRIORITY_SLOTS};
use xcan_core::Memory;

/// One ranked transmission candidate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Priority Queue slot rather than a FIFO head
    pub priority: bool,
    /// Slot number (Priority Queue) or queue number (FIFO)
    pub index: u8,
    /// Descriptor offset past the queue's read position; always 0 for
    /// Priority Queue slots
    pub offset: u16,
}

/// Outcome of one scan pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// The two candidates to transmit next
    pub first: [Option<Candidate>; 2],
    /// The two runners-up once the first pair is gone
    pub best: [Option<Candidate>; 2],
}

/// Ranking between two candidates.
pub trait ScanPolicy {
    /// Whether `a` is transmitted ahead of `b`.
    fn precedes(&self, a: &Candidate, b: &Candidate) -> bool;
}

/// Default ranking: Priority Queue slots ahead of FIFO heads, lower index
/// first within each class.
#[derive(Copy, Clone, Debug, Default)]
pub struct IndexOrder;

impl ScanPolicy for IndexOrder {
    fn precedes(&self, a: &Candidate, b: &Candidate) -> bool {
        match (a.priority, b.priority) {
            (true, false) => true,
            (false, true) => false,
            _ => a.index < b.index,
        }
    }
}

/// TX FIFO queues one X_CAN instance owns; the scan never looks further.
pub const FIFO_QUEUES: usize = 8;

// Every PQ slot, every FIFO head, plus the exposed followers of up to four
// FIFO selections.
const POOL: usize = PRIORITY_SLOTS + FIFO_QUEUES + 4;

/// Ranks the pending descriptors of `priority` and `fifos` into a report.
///
/// Only the first [`FIFO_QUEUES`] entries of `fifos` take part, matching
/// the hardware's queue count; extra entries are ignored.
///
/// The scan only reads VALID bits; repeated over unchanged state it yields
/// the same report.
pub fn scan<M: Memory, P: ScanPolicy>(
    memory: &M,
    policy: &P,
    priority: &TxPriorityQueue,
    fifos: &[TxFifoQueue],
) -> ScanReport {
    let mut pool = [Candidate {
        priority: false,
        index: 0,
        offset: 0,
    }; POOL];
    let mut len = 0;
    for slot in priority.pending_slots(memory).iter() {
        pool[len] = Candidate {
            priority: true,
            index: slot,
            offset: 0,
        };
        len += 1;
    }
    let fifos = &fifos[..fifos.len().min(FIFO_QUEUES)];
    for fifo in fifos {
        if fifo.pending_at(memory, 0) {
            pool[len] = Candidate {
                priority: false,
                index: fifo.queue_number(),
                offset: 0,
            };
            len += 1;
        }
    }

    let mut winners = [None; 4];
    for winner in winners.iter_mut() {
        if len == 0 {
            break;
        }
        // Stable argmin over the pool; ties keep the earlier entry.
        let mut chosen = 0;
        for i in 1..len {
            if policy.precedes(&pool[i], &pool[chosen]) {
                chosen = i;
            }
        }
        let candidate = pool[chosen];
        pool[chosen] = pool[len - 1];
        len -= 1;
        *winner = Some(candidate);
        if !candidate.priority {
            // Taking a FIFO head exposes the descriptor behind it.
            let exposed = fifos
                .iter()
                .find(|q| q.queue_number() == candidate.index)
                .is_some_and(|q| q.pending_at(memory, candidate.offset + 1));
            if exposed {
                pool[len] = Candidate {
                    offset: candidate.offset + 1,
                    ..candidate
                };
                len += 1;
            }
        }
    }
    ScanReport {
        first: [winners[0], winners[1]],
        best: [winners[2], winners[3]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MhConfig, TxFifoConfig};
    use crate::descriptor::tx::{TxDescriptor, TxPayload};
    use crate::message::{ClassicHeader, Header};
    use embedded_can::{Id, StandardId};

    struct Ram([u32; 1024]);

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
                id: Id::Standard(StandardId::new(1).unwrap()),
                dlc: 0,
                remote: false,
                fault_injection: false,
            }),
            TxPayload::Inline { td0: 0, td1: 0 },
        )
    }

    fn priority_queue() -> TxPriorityQueue {
        // Slots at 0x000..0x400.
        let mut q = TxPriorityQueue::new(&MhConfig::default());
        q.configure(0).unwrap();
        q.start();
        q
    }

    fn fifo(queue: u8, start_address: u32) -> TxFifoQueue {
        let mut q = TxFifoQueue::new(queue, &MhConfig::default());
        q.configure(TxFifoConfig {
            start_address,
            max_desc: 4,
        })
        .unwrap();
        q.start().unwrap();
        q
    }

    const PQ: Candidate = Candidate {
        priority: true,
        index: 0,
        offset: 0,
    };
    const FQ: Candidate = Candidate {
        priority: false,
        index: 0,
        offset: 0,
    };

    #[test]
    fn priority_slots_outrank_fifo_heads() {
        let mut ram = Ram([0; 1024]);
        let mut pq = priority_queue();
        let mut f0 = fifo(0, 0x400);
        pq.claim(&mut ram, 9, descriptor()).unwrap();
        pq.claim(&mut ram, 3, descriptor()).unwrap();
        f0.claim(&mut ram, descriptor()).unwrap();

        let report = scan(&ram, &IndexOrder, &pq, core::slice::from_ref(&f0));
        assert_eq!(
            report.first,
            [Some(Candidate { index: 3, ..PQ }), Some(Candidate { index: 9, ..PQ })]
        );
        assert_eq!(report.best, [Some(FQ), None]);
    }

    #[test]
    fn taking_a_fifo_head_exposes_its_follower() {
        let mut ram = Ram([0; 1024]);
        let pq = priority_queue();
        let mut f0 = fifo(0, 0x400);
        for _ in 0..3 {
            f0.claim(&mut ram, descriptor()).unwrap();
        }

        let report = scan(&ram, &IndexOrder, &pq, core::slice::from_ref(&f0));
        assert_eq!(
            report.first,
            [Some(FQ), Some(Candidate { offset: 1, ..FQ })]
        );
        assert_eq!(
            report.best,
            [Some(Candidate { offset: 2, ..FQ }), None]
        );
    }

    #[test]
    fn fifo_heads_tie_break_on_queue_number() {
        let mut ram = Ram([0; 1024]);
        let pq = priority_queue();
        let mut f5 = fifo(5, 0x400);
        let mut f1 = fifo(1, 0x500);
        f5.claim(&mut ram, descriptor()).unwrap();
        f1.claim(&mut ram, descriptor()).unwrap();

        let fifos = [f5, f1];
        let report = scan(&ram, &IndexOrder, &pq, &fifos);
        assert_eq!(
            report.first,
            [Some(Candidate { index: 1, ..FQ }), Some(Candidate { index: 5, ..FQ })]
        );
    }

    #[test]
    fn scan_is_a_pure_snapshot() {
        let mut ram = Ram([0; 1024]);
        let mut pq = priority_queue();
        let mut f0 = fifo(0, 0x400);
        pq.claim(&mut ram, 31, descriptor()).unwrap();
        f0.claim(&mut ram, descriptor()).unwrap();
        f0.claim(&mut ram, descriptor()).unwrap();

        let fifos = [f0];
        let a = scan(&ram, &IndexOrder, &pq, &fifos);
        let b = scan(&ram, &IndexOrder, &pq, &fifos);
        assert_eq!(a, b);
        assert_ne!(a, ScanReport::default());
    }

    #[test]
    fn ranking_policy_is_injectable() {
        struct FifoFirst;
        impl ScanPolicy for FifoFirst {
            fn precedes(&self, a: &Candidate, b: &Candidate) -> bool {
                match (a.priority, b.priority) {
                    (false, true) => true,
                    (true, false) => false,
                    _ => a.index < b.index,
                }
            }
        }

        let mut ram = Ram([0; 1024]);
        let mut pq = priority_queue();
        let mut f0 = fifo(0, 0x400);
        pq.claim(&mut ram, 0, descriptor()).unwrap();
        f0.claim(&mut ram, descriptor()).unwrap();

        let fifos = [f0];
        let report = scan(&ram, &FifoFirst, &pq, &fifos);
        assert_eq!(report.first[0], Some(FQ));
        assert_eq!(report.first[1], Some(PQ));
    }

    #[test]
    fn full_small_ring_yields_no_phantom_followers() {
        let mut ram = Ram([0; 1024]);
        let pq = priority_queue();
        let mut f0 = TxFifoQueue::new(0, &MhConfig::default());
        f0.configure(TxFifoConfig {
            start_address: 0x400,
            max_desc: 2,
        })
        .unwrap();
        f0.start().unwrap();
        f0.claim(&mut ram, descriptor()).unwrap();
        let mut d = descriptor();
        d.wrap = true;
        f0.claim(&mut ram, d).unwrap();

        // Two claimed descriptors mean exactly two candidates; the exposed
        // follower must not wrap back onto a slot already selected.
        let report = scan(&ram, &IndexOrder, &pq, core::slice::from_ref(&f0));
        assert_eq!(
            report.first,
            [Some(FQ), Some(Candidate { offset: 1, ..FQ })]
        );
        assert_eq!(report.best, [None, None]);
    }

    #[test]
    fn queues_past_the_hardware_count_are_ignored() {
        let mut ram = Ram([0; 1024]);
        let pq = priority_queue();
        let mut fifos = std::vec::Vec::new();
        for i in 0..10u8 {
            let mut f = fifo(i, 0x400 + u32::from(i) * 0x80);
            f.claim(&mut ram, descriptor()).unwrap();
            fifos.push(f);
        }

        let report = scan(&ram, &IndexOrder, &pq, &fifos);
        assert_eq!(
            report.first,
            [Some(FQ), Some(Candidate { index: 1, ..FQ })]
        );
        assert_eq!(
            report.best,
            [
                Some(Candidate { index: 2, ..FQ }),
                Some(Candidate { index: 3, ..FQ })
            ]
        );
    }

    #[test]
    fn empty_queues_yield_an_empty_report() {
        let ram = Ram([0; 1024]);
        let pq = priority_queue();
        let f0 = fifo(0, 0x400);
        let fifos = [f0];
        assert_eq!(scan(&ram, &IndexOrder, &pq, &fifos), ScanReport::default());
    }
}
