//! Descriptor ownership hand-off
//!
//! A descriptor slot is shared by exactly two actors: the software producer
//! and the hardware consumer. Ownership is conveyed through the single VALID
//! bit, not a lock: software must not touch any descriptor field after
//! setting VALID until it observes the completion write-back. This module
//! models that hand-off as an explicit state machine with an owning-side
//! tag, plus the rolling-counter sequencing rule every FIFO queue enforces
//! at fetch time.

/// The side currently allowed to mutate a descriptor slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    /// Software may prepare or read back the descriptor
    Software,
    /// The Message Handler may fetch and write back the descriptor
    Hardware,
}

/// Hand-off state of one descriptor slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DescriptorState {
    /// No descriptor handed over; software owns the slot
    #[default]
    Free,
    /// Software set VALID; the consumer may fetch at any time
    Claimed,
    /// Fetched by the consumer, completion pending
    InFlight,
    /// Status written back, VALID cleared; awaiting software acknowledge
    Completed,
}

/// The slot already carries a valid, unconsumed descriptor
#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyClaimed;

/// Completion was reported for a slot that was never fetched
#[derive(Debug, PartialEq, Eq)]
pub struct NotFetched;

/// Why the consumer-side fetch of a descriptor was refused.
///
/// All variants are hard errors: the affected queue stalls and is left for
/// software to reconfigure, none of them is retried by this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    /// The descriptor's VALID bit was not set (ownership violation)
    UnvalidDescriptorFetched,
    /// The rolling counter did not continue the queue's sequence
    Sequence {
        /// Counter value the queue expected
        expected: u8,
        /// Counter value found in the descriptor
        observed: u8,
    },
    /// The descriptor CRC did not match its contents
    Crc {
        /// CRC computed over the fetched descriptor
        expected: u16,
        /// CRC field found in the descriptor
        observed: u16,
    },
    /// The descriptor names another X_CAN instance
    WrongInstance {
        /// Instance number this Message Handler is configured with
        expected: u8,
        /// Instance number found in the descriptor
        observed: u8,
    },
    /// The descriptor is bound to a different queue than it was fetched from
    WrongQueue {
        /// Queue the descriptor was fetched from
        expected: u8,
        /// Queue number found in the descriptor
        observed: u8,
    },
    /// The descriptor words do not decode
    Malformed,
}

impl DescriptorState {
    /// The actor currently owning the slot.
    pub fn owner(&self) -> Owner {
        match self {
            DescriptorState::Free | DescriptorState::Completed => Owner::Software,
            DescriptorState::Claimed | DescriptorState::InFlight => Owner::Hardware,
        }
    }

    /// Software hands the slot to the consumer.
    pub fn claim(&mut self) -> Result<(), AlreadyClaimed> {
        match self {
            DescriptorState::Free | DescriptorState::Completed => {
                *self = DescriptorState::Claimed;
                Ok(())
            }
            _ => Err(AlreadyClaimed),
        }
    }

    /// The consumer fetches the slot. Fetching a slot that was not claimed
    /// is the ownership violation from the error taxonomy, never a silent
    /// success.
    pub fn fetch(&mut self) -> Result<(), FetchError> {
        match self {
            DescriptorState::Claimed => {
                *self = DescriptorState::InFlight;
                Ok(())
            }
            _ => Err(FetchError::UnvalidDescriptorFetched),
        }
    }

    /// The consumer reports completion for a fetched slot.
    pub fn complete(&mut self) -> Result<(), NotFetched> {
        match self {
            DescriptorState::InFlight => {
                *self = DescriptorState::Completed;
                Ok(())
            }
            _ => Err(NotFetched),
        }
    }

    /// Software acknowledges the completion, freeing the slot for reuse.
    pub fn release(&mut self) {
        if let DescriptorState::Completed = self {
            *self = DescriptorState::Free;
        }
    }
}

/// Modulo-32 rolling counter tracking the fetch order of one queue.
///
/// Software stamps each claimed descriptor with the next value; the consumer
/// checks the stamp on fetch. A gap means a descriptor was lost or the two
/// sides desynchronized, which is fatal to the queue's current run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RollingCounter {
    next: u8,
}

impl RollingCounter {
    /// Counter modulus; RC occupies 5 bits.
    pub const MODULUS: u8 = 32;

    /// A counter expecting 0, the value every queue starts its run with.
    pub fn new() -> Self {
        Self::default()
    }

    /// The value the next descriptor must carry.
    pub fn peek(&self) -> u8 {
        self.next
    }

    /// Takes the next value, advancing the sequence.
    pub fn advance(&mut self) -> u8 {
        let value = self.next;
        self.next = (value + 1) % Self::MODULUS;
        value
    }

    /// Checks `observed` against the sequence, advancing on a match.
    pub fn check(&mut self, observed: u8) -> Result<(), FetchError> {
        if observed == self.next {
            self.advance();
            Ok(())
        } else {
            Err(FetchError::Sequence {
                expected: self.next,
                observed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle() {
        let mut state = DescriptorState::Free;
        assert_eq!(state.owner(), Owner::Software);
        state.claim().unwrap();
        assert_eq!(state.owner(), Owner::Hardware);
        state.fetch().unwrap();
        assert_eq!(state.owner(), Owner::Hardware);
        state.complete().unwrap();
        assert_eq!(state.owner(), Owner::Software);
        state.release();
        assert_eq!(state, DescriptorState::Free);
    }

    #[test]
    fn double_claim_is_refused() {
        let mut state = DescriptorState::Free;
        state.claim().unwrap();
        assert_eq!(state.claim(), Err(AlreadyClaimed));
        assert_eq!(state, DescriptorState::Claimed);
    }

    #[test]
    fn fetch_of_unclaimed_slot_is_a_violation() {
        let mut state = DescriptorState::Free;
        assert_eq!(state.fetch(), Err(FetchError::UnvalidDescriptorFetched));

        let mut state = DescriptorState::Completed;
        assert_eq!(state.fetch(), Err(FetchError::UnvalidDescriptorFetched));
    }

    #[test]
    fn completion_requires_a_fetch() {
        let mut state = DescriptorState::Claimed;
        assert_eq!(state.complete(), Err(NotFetched));
    }

    #[test]
    fn rolling_counter_accepts_the_full_wrapping_sequence() {
        let mut rc = RollingCounter::new();
        for value in (0..32).chain(0..8) {
            rc.check(value % 32).unwrap();
        }
    }

    #[test]
    fn rolling_counter_rejects_any_skip() {
        for skipped in 0..32u8 {
            let mut rc = RollingCounter::new();
            for value in 0..skipped {
                rc.check(value).unwrap();
            }
            let observed = (skipped + 1) % 32;
            assert_eq!(
                rc.check(observed),
                Err(FetchError::Sequence {
                    expected: skipped,
                    observed,
                })
            );
        }
    }
}
