//! RX descriptor word layout
//!
//! An RX descriptor is 4 words: `[RIC1, RX_AP, TS0, TS1]`. Software prepares
//! the descriptor with the data container address (Normal mode) and hands it
//! over; the Message Handler writes the outcome, the message address
//! (Continuous mode), the NEXT/HD marks and the timestamp back into it.

use super::{bytes_to_words, words_to_bytes, Crc9, MalformedDescriptor, RxStatus};
use xcan_core::Memory;

/// Number of 32-bit words in an RX descriptor
pub const RX_DESCRIPTOR_WORDS: usize = 4;
/// Size of an encoded RX descriptor in bytes
pub const RX_DESCRIPTOR_BYTES: usize = 16;

/// Raw RX descriptor memory representation
pub type RawRxDescriptor = [u32; RX_DESCRIPTOR_WORDS];

/// One RX message descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RxDescriptor {
    /// Reception outcome (STS), hardware-written
    pub status: RxStatus,
    /// Rolling counter (RC), 0..=31
    pub rolling_counter: u8,
    /// X_CAN instance number expected to fetch this descriptor (IN)
    pub instance: u8,
    /// Owning RX FIFO queue number (FQN), 0..=7
    pub queue: u8,
    /// 9-bit descriptor CRC, zero when integrity checking is off
    pub crc: u16,
    /// Raise a completion event when a message lands in this descriptor (IRQ)
    pub irq: bool,
    /// More descriptors belong to this message (NEXT), hardware-written on
    /// the header descriptor only
    pub next: bool,
    /// Header descriptor flag (HD), hardware-written
    pub header_descriptor: bool,
    /// Ownership flag (VALID); set by software, cleared by the consumer
    pub valid: bool,
    /// Data container address (RX_AP): supplied by software per descriptor
    /// in Normal mode, written back by the Message Handler in Continuous
    /// mode. Word-aligned.
    pub data_address: u32,
    /// 64-bit reception timestamp, hardware-written
    pub timestamp: u64,
}

impl RxDescriptor {
    /// A fresh descriptor for RX FIFO queue `queue` with all hand-off fields
    /// in their software-initial state.
    pub fn new(queue: u8) -> Self {
        Self {
            status: RxStatus::None,
            rolling_counter: 0,
            instance: 0,
            queue,
            crc: 0,
            irq: false,
            next: false,
            header_descriptor: false,
            valid: false,
            data_address: 0,
            timestamp: 0,
        }
    }

    /// Packs the descriptor into its 4-word memory representation.
    pub fn to_words(&self) -> RawRxDescriptor {
        let ric1 = self.status.to_bits()
            | (self.rolling_counter as u32 & 0x1f) << 4
            | (self.instance as u32 & 0x7) << 9
            | (self.queue as u32 & 0x7) << 12
            | (self.crc as u32 & 0x1ff) << 16
            | (self.irq as u32) << 27
            | (self.next as u32) << 28
            | (self.header_descriptor as u32) << 30
            | (self.valid as u32) << 31;
        [
            ric1,
            self.data_address,
            self.timestamp as u32,
            (self.timestamp >> 32) as u32,
        ]
    }

    /// Unpacks a descriptor from its 4-word memory representation.
    pub fn from_words(words: RawRxDescriptor) -> Result<Self, MalformedDescriptor> {
        let [ric1, rx_ap, ts0, ts1] = words;
        Ok(Self {
            status: RxStatus::from_bits(ric1)?,
            rolling_counter: ((ric1 >> 4) & 0x1f) as u8,
            instance: ((ric1 >> 9) & 0x7) as u8,
            queue: ((ric1 >> 12) & 0x7) as u8,
            crc: ((ric1 >> 16) & 0x1ff) as u16,
            irq: ric1 & (1 << 27) != 0,
            next: ric1 & (1 << 28) != 0,
            header_descriptor: ric1 & (1 << 30) != 0,
            valid: ric1 & (1 << 31) != 0,
            data_address: rx_ap,
            timestamp: (ts1 as u64) << 32 | ts0 as u64,
        })
    }

    /// Encodes the descriptor to its 16-byte little-endian form.
    pub fn encode(&self) -> [u8; RX_DESCRIPTOR_BYTES] {
        words_to_bytes(&self.to_words())
    }

    /// Decodes a descriptor from its 16-byte little-endian form.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedDescriptor> {
        if bytes.len() != RX_DESCRIPTOR_BYTES {
            return Err(MalformedDescriptor);
        }
        Self::from_words(bytes_to_words(bytes))
    }

    /// Computes the 9-bit CRC over the descriptor with the CRC field forced
    /// to zero.
    pub fn compute_crc(&self, crc: &Crc9) -> u16 {
        let mut words = self.to_words();
        words[0] &= !(0x1ff << 16); // CRC
        crc.compute(&words_to_bytes::<RX_DESCRIPTOR_WORDS, RX_DESCRIPTOR_BYTES>(&words))
    }

    /// Returns the descriptor with its CRC field populated.
    pub fn with_crc(mut self, crc: &Crc9) -> Self {
        self.crc = self.compute_crc(crc);
        self
    }

    /// Writes the encoded descriptor to system memory at `address`.
    pub fn write_to<M: Memory>(&self, memory: &mut M, address: u32) {
        memory.write_words(address, &self.to_words());
    }

    /// Reads a descriptor back from system memory at `address`.
    pub fn read_from<M: Memory>(memory: &M, address: u32) -> Result<Self, MalformedDescriptor> {
        let mut words = [0; RX_DESCRIPTOR_WORDS];
        memory.read_words(address, &mut words);
        Self::from_words(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> RxDescriptor {
        let mut d = RxDescriptor::new(6);
        d.rolling_counter = 31;
        d.instance = 1;
        d.irq = true;
        d.valid = true;
        d.data_address = 0x2000_4000;
        d
    }

    #[test]
    fn round_trip() {
        let d = descriptor();
        assert_eq!(RxDescriptor::decode(&d.encode()), Ok(d));
    }

    #[test]
    fn round_trip_completed() {
        let mut d = descriptor();
        d.status = RxStatus::MessageReceiveSuccess;
        d.next = true;
        d.header_descriptor = true;
        d.valid = false;
        d.timestamp = 0x0123_4567_89ab_cdef;
        assert_eq!(RxDescriptor::decode(&d.encode()), Ok(d));
    }

    #[test]
    fn control_bit_positions() {
        let ric1 = descriptor().to_words()[0];
        assert_ne!(ric1 & (1 << 31), 0); // VALID
        assert_eq!(ric1 & (1 << 30), 0); // HD not yet written
        assert_ne!(ric1 & (1 << 27), 0); // IRQ
        assert_eq!((ric1 >> 4) & 0x1f, 31); // RC
        assert_eq!((ric1 >> 9) & 0x7, 1); // IN
        assert_eq!((ric1 >> 12) & 0x7, 6); // FQN
    }

    #[test]
    fn crc_field_is_excluded_from_its_own_check() {
        let crc = Crc9::default();
        let mut d = descriptor();
        let reference = d.compute_crc(&crc);
        d.crc = 0x1ff;
        assert_eq!(d.compute_crc(&crc), reference);
        d.queue = 7;
        assert_ne!(d.compute_crc(&crc), reference);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(RxDescriptor::decode(&[0; 15]), Err(MalformedDescriptor));
        assert_eq!(RxDescriptor::decode(&[0; 32]), Err(MalformedDescriptor));
    }
}
