//! Descriptor ring bookkeeping
//!
//! Every FIFO queue walks a wrap-around ring of descriptor slots in system
//! memory. The ring itself only tracks geometry and position: start address,
//! number of slots, current index and the run state. Which descriptor may be
//! consumed, and whether the walk wraps or ends, is decided by the queue from
//! the descriptor's own WRAP/END bits and passed in on [`QueueRing::advance`].

/// Run state of a descriptor ring.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RingState {
    /// Not started; geometry may be reconfigured
    #[default]
    Inactive,
    /// Walking descriptors
    Running,
    /// Consumed a descriptor with END set, or ran off the last slot
    Ended,
    /// A fetch error was raised; frozen until software reconfigures
    Stalled,
}

/// Geometry writes are refused while the queue is in use
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigurationWhileBusy;

/// The queue is stopped, stalled or has consumed its END descriptor
#[derive(Debug, PartialEq, Eq)]
pub struct NotRunning;

/// The ring was started with zero descriptor slots
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorConfigurationError;

/// Position and geometry of one descriptor ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueRing {
    start_address: u32,
    max_desc: u16,
    desc_bytes: u32,
    index: u16,
    state: RingState,
}

impl QueueRing {
    /// An inactive, zero-sized ring over slots of `desc_bytes` bytes.
    pub fn new(desc_bytes: u32) -> Self {
        Self {
            start_address: 0,
            max_desc: 0,
            desc_bytes,
            index: 0,
            state: RingState::Inactive,
        }
    }

    /// Sets the ring geometry. A zero `max_desc` is accepted here and only
    /// rejected on [`start`](Self::start), matching a size register that can
    /// hold any value while the queue is down.
    pub fn configure(
        &mut self,
        start_address: u32,
        max_desc: u16,
    ) -> Result<(), ConfigurationWhileBusy> {
        if self.is_busy() {
            return Err(ConfigurationWhileBusy);
        }
        self.start_address = start_address;
        self.max_desc = max_desc;
        self.index = 0;
        self.state = RingState::Inactive;
        Ok(())
    }

    /// Starts the walk at slot 0.
    pub fn start(&mut self) -> Result<(), DescriptorConfigurationError> {
        if self.max_desc == 0 {
            return Err(DescriptorConfigurationError);
        }
        self.index = 0;
        self.state = RingState::Running;
        Ok(())
    }

    /// Moves to the next slot after a descriptor was consumed. `wrap` is the
    /// consumed descriptor's WRAP bit: it sends the walk back to slot 0 and
    /// is what keeps a FIFO circular. Without it, running off the last
    /// configured slot ends the ring.
    pub fn advance(&mut self, wrap: bool) {
        if self.state != RingState::Running {
            return;
        }
        if wrap {
            self.index = 0;
        } else if self.index + 1 >= self.max_desc {
            self.state = RingState::Ended;
        } else {
            self.index += 1;
        }
    }

    /// Marks the ring ended (END bit consumed).
    pub fn end(&mut self) {
        self.state = RingState::Ended;
    }

    /// Freezes the ring after a fetch error.
    pub fn stall(&mut self) {
        self.state = RingState::Stalled;
    }

    /// Takes the ring down, allowing reconfiguration.
    pub fn stop(&mut self) {
        self.state = RingState::Inactive;
        self.index = 0;
    }

    /// Address of the current slot.
    pub fn current_address(&self) -> u32 {
        self.start_address + self.index as u32 * self.desc_bytes
    }

    /// Address of slot `index`, regardless of the current position.
    pub fn slot_address(&self, index: u16) -> u32 {
        self.start_address + index as u32 * self.desc_bytes
    }

    /// Current slot index.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Configured number of slots.
    pub fn max_desc(&self) -> u16 {
        self.max_desc
    }

    /// Configured start address.
    pub fn start_address(&self) -> u32 {
        self.start_address
    }

    /// Current run state.
    pub fn state(&self) -> RingState {
        self.state
    }

    /// Whether the ring is in use. Busy rings refuse geometry writes;
    /// a stalled ring is still busy because its position is live state an
    /// error handler may want to inspect.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, RingState::Running | RingState::Stalled)
    }
}
