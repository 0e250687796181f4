//! Message Handler configuration
//!
//! Plain value types software fills in before starting a queue. Geometry is
//! latched on configure and refused while the queue is busy; the live
//! pointers derived from it are read-only.

/// Reception hand-off mode of an RX FIFO queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RxMode {
    /// One data-container slice per descriptor, address supplied by software
    #[default]
    Normal,
    /// One shared data container; the Message Handler allocates space and
    /// writes the message address back into the header descriptor
    Continuous,
}

/// Geometry of one TX FIFO queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TxFifoConfig {
    /// Word-aligned address of the first descriptor slot
    pub start_address: u32,
    /// Number of descriptor slots
    pub max_desc: u16,
}

/// Geometry of one RX FIFO queue and its data container.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RxFifoConfig {
    /// Word-aligned address of the first descriptor slot
    pub start_address: u32,
    /// Number of descriptor slots
    pub max_desc: u16,
    /// Word-aligned start address of the data container
    pub dc_start_address: u32,
    /// Data container size in bytes: per descriptor slice in Normal mode,
    /// the whole shared container in Continuous mode
    pub dc_size: u32,
    /// Hand-off mode
    pub mode: RxMode,
}

/// Instance-wide knobs shared by every queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MhConfig {
    /// X_CAN instance number stamped into and checked against descriptors
    pub instance_number: u8,
    /// Verify the 9-bit CRC of fetched TX descriptors
    pub tx_desc_crc: bool,
    /// Verify the 9-bit CRC of fetched RX descriptors
    pub rx_desc_crc: bool,
}
