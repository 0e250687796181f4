//! TX descriptor word layout
//!
//! A TX descriptor is 8 words: `[TIC1, TIC2, TS0, TS1, T0, T1, TD0/T2,
//! TD1/TX_AP]`. TIC1 carries the hand-off control bits (VALID, HD, WRAP,
//! END, rolling counter, CRC), TIC2 the payload geometry, TS0/TS1 the
//! timestamp written back on completion and T0/T1 the frame header. The last
//! two words are the inline payload, or the payload address pointer, or the
//! CAN XL acceptance field, depending on frame format and payload source.

use super::{bytes_to_words, words_to_bytes, Crc9, MalformedDescriptor, TxStatus};
use crate::message::Header;
use xcan_core::Memory;

/// Number of 32-bit words in a TX descriptor
pub const TX_DESCRIPTOR_WORDS: usize = 8;
/// Size of an encoded TX descriptor in bytes
pub const TX_DESCRIPTOR_BYTES: usize = 32;

/// Raw TX descriptor memory representation
pub type RawTxDescriptor = [u32; TX_DESCRIPTOR_WORDS];

/// Queue a TX descriptor belongs to; encoded in the PQ bit plus the
/// PQSN/FQN field, which are mutually exclusive interpretations of the same
/// bit range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueBinding {
    /// TX FIFO Queue `queue` (0..=7)
    Fifo {
        /// FIFO queue number
        queue: u8,
    },
    /// TX Priority Queue slot `slot` (0..=31)
    Priority {
        /// Slot number
        slot: u8,
    },
}

/// Where the Message Handler finds the payload data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxPayload {
    /// Payload embedded in the descriptor itself (Classical CAN, or CAN FD
    /// up to 4 bytes)
    Inline {
        /// First payload word
        td0: u32,
        /// Second payload word
        td1: u32,
    },
    /// First payload word inline, remainder fetched from system memory
    /// (CAN FD above 4 bytes)
    Container {
        /// Copy of the first payload word
        td0: u32,
        /// Word-aligned payload address in system memory
        address: u32,
    },
    /// CAN XL: acceptance field plus payload address, never inline
    XlContainer {
        /// Acceptance field (T2)
        acceptance: u32,
        /// Word-aligned payload address in system memory
        address: u32,
    },
}

/// One TX message descriptor.
///
/// `status` and `timestamp` are written back by the Message Handler when the
/// descriptor completes; every other field is owned by software until the
/// VALID bit is set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxDescriptor {
    /// Transmission outcome (STS), hardware-written
    pub status: TxStatus,
    /// Rolling counter (RC), 0..=31; pinned to 0 on the Priority Queue
    pub rolling_counter: u8,
    /// Owning queue (PQ + PQSN/FQN)
    pub binding: QueueBinding,
    /// 9-bit descriptor CRC, zero when integrity checking is off
    pub crc: u16,
    /// The FIFO queue ends after this descriptor (END); illegal on the
    /// Priority Queue
    pub end: bool,
    /// Raise a completion event when the descriptor has been executed (IRQ)
    pub irq: bool,
    /// The next descriptor is the first of the FIFO queue (WRAP); illegal on
    /// the Priority Queue
    pub wrap: bool,
    /// Header descriptor flag (HD); only header descriptors carry ownership
    pub header_descriptor: bool,
    /// Ownership flag (VALID); set by software, cleared by the consumer
    pub valid: bool,
    /// X_CAN instance number expected to fetch this descriptor (IN)
    pub instance: u8,
    /// Payload size in words (SIZE); 0 means no payload data attached
    pub size_words: u16,
    /// 64-bit completion timestamp, hardware-written
    pub timestamp: u64,
    /// Frame header (T0/T1)
    pub header: Header,
    /// Payload words or address pointer (TD0/T2, TD1/TX_AP)
    pub payload: TxPayload,
}

impl TxDescriptor {
    /// A fresh descriptor for `header`/`payload` with all hand-off fields in
    /// their software-initial state.
    pub fn new(header: Header, payload: TxPayload) -> Self {
        Self {
            status: TxStatus::None,
            rolling_counter: 0,
            binding: QueueBinding::Fifo { queue: 0 },
            crc: 0,
            end: false,
            irq: false,
            wrap: false,
            header_descriptor: true,
            valid: false,
            instance: 0,
            size_words: 0,
            timestamp: 0,
            header,
            payload,
        }
    }

    /// Packs the descriptor into its 8-word memory representation.
    pub fn to_words(&self) -> RawTxDescriptor {
        let queue_field = match self.binding {
            QueueBinding::Fifo { queue } => (queue as u32 & 0x7) << 12, // FQN
            QueueBinding::Priority { slot } => (slot as u32 & 0x1f) << 11, // PQSN
        };
        let pq = matches!(self.binding, QueueBinding::Priority { .. });
        let tic1 = self.status.to_bits()
            | (self.rolling_counter as u32 & 0x1f) << 4
            | queue_field
            | (self.crc as u32 & 0x1ff) << 16
            | (self.end as u32) << 25
            | (pq as u32) << 26
            | (self.irq as u32) << 27
            | (self.wrap as u32) << 29
            | (self.header_descriptor as u32) << 30
            | (self.valid as u32) << 31;
        // TDO is a fixed pattern: all-ones for FIFO descriptors, zero for
        // Priority Queue slots.
        let tdo = if pq { 0 } else { 0x3ff << 2 };
        let plsrc = !matches!(self.payload, TxPayload::Inline { .. });
        let tic2 = tdo
            | (self.instance as u32 & 0x7) << 13
            | (self.size_words as u32 & 0x3ff) << 16
            | (plsrc as u32) << 26;
        let (t0, t1) = self.header.to_words();
        let (w6, w7) = match self.payload {
            TxPayload::Inline { td0, td1 } => (td0, td1),
            TxPayload::Container { td0, address } => (td0, address),
            TxPayload::XlContainer {
                acceptance,
                address,
            } => (acceptance, address),
        };
        [
            tic1,
            tic2,
            self.timestamp as u32,
            (self.timestamp >> 32) as u32,
            t0,
            t1,
            w6,
            w7,
        ]
    }

    /// Unpacks a descriptor from its 8-word memory representation.
    pub fn from_words(words: RawTxDescriptor) -> Result<Self, MalformedDescriptor> {
        let [tic1, tic2, ts0, ts1, t0, t1, w6, w7] = words;
        let pq = tic1 & (1 << 26) != 0;
        let binding = if pq {
            QueueBinding::Priority {
                slot: ((tic1 >> 11) & 0x1f) as u8,
            }
        } else {
            QueueBinding::Fifo {
                queue: ((tic1 >> 12) & 0x7) as u8,
            }
        };
        let header = Header::from_words(t0, t1);
        let plsrc = tic2 & (1 << 26) != 0;
        let payload = if header.is_xl() {
            TxPayload::XlContainer {
                acceptance: w6,
                address: w7,
            }
        } else if plsrc {
            TxPayload::Container { td0: w6, address: w7 }
        } else {
            TxPayload::Inline { td0: w6, td1: w7 }
        };
        Ok(Self {
            status: TxStatus::from_bits(tic1)?,
            rolling_counter: ((tic1 >> 4) & 0x1f) as u8,
            binding,
            crc: ((tic1 >> 16) & 0x1ff) as u16,
            end: tic1 & (1 << 25) != 0,
            irq: tic1 & (1 << 27) != 0,
            wrap: tic1 & (1 << 29) != 0,
            header_descriptor: tic1 & (1 << 30) != 0,
            valid: tic1 & (1 << 31) != 0,
            instance: ((tic2 >> 13) & 0x7) as u8,
            size_words: ((tic2 >> 16) & 0x3ff) as u16,
            timestamp: (ts1 as u64) << 32 | ts0 as u64,
            header,
            payload,
        })
    }

    /// Encodes the descriptor to its 32-byte little-endian form.
    pub fn encode(&self) -> [u8; TX_DESCRIPTOR_BYTES] {
        words_to_bytes(&self.to_words())
    }

    /// Decodes a descriptor from its 32-byte little-endian form.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedDescriptor> {
        if bytes.len() != TX_DESCRIPTOR_BYTES {
            return Err(MalformedDescriptor);
        }
        Self::from_words(bytes_to_words(bytes))
    }

    /// Computes the 9-bit CRC over the descriptor with the CRC field forced
    /// to zero, as the integrity check requires.
    pub fn compute_crc(&self, crc: &Crc9) -> u16 {
        let mut words = self.to_words();
        words[0] &= !(0x1ff << 16); // CRC
        crc.compute(&words_to_bytes::<TX_DESCRIPTOR_WORDS, TX_DESCRIPTOR_BYTES>(&words))
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
        let mut words = [0; TX_DESCRIPTOR_WORDS];
        memory.read_words(address, &mut words);
        Self::from_words(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClassicHeader, FdHeader, XlHeader};
    use embedded_can::{Id, StandardId};

    fn classic_header() -> Header {
        Header::Classic(ClassicHeader {
            id: Id::Standard(StandardId::new(0x321).unwrap()),
            dlc: 8,
            remote: false,
            fault_injection: false,
        })
    }

    fn descriptor() -> TxDescriptor {
        let mut d = TxDescriptor::new(
            classic_header(),
            TxPayload::Inline {
                td0: 0xdead_beef,
                td1: 0x0102_0304,
            },
        );
        d.rolling_counter = 17;
        d.binding = QueueBinding::Fifo { queue: 5 };
        d.irq = true;
        d.wrap = true;
        d.valid = true;
        d.instance = 3;
        d.size_words = 2;
        d
    }

    #[test]
    fn round_trip_inline() {
        let d = descriptor();
        assert_eq!(TxDescriptor::decode(&d.encode()), Ok(d));
    }

    #[test]
    fn round_trip_container() {
        let mut d = descriptor();
        d.header = Header::Fd(FdHeader {
            id: Id::Standard(StandardId::new(0x44).unwrap()),
            dlc: 13,
            error_state_indicator: false,
            bit_rate_switching: true,
            fault_injection: false,
        });
        d.payload = TxPayload::Container {
            td0: 0x1111_2222,
            address: 0x2000_1000,
        };
        d.size_words = 8;
        assert_eq!(TxDescriptor::decode(&d.encode()), Ok(d));
    }

    #[test]
    fn round_trip_xl() {
        let mut d = descriptor();
        d.header = Header::Xl(XlHeader {
            priority_id: 0x100,
            vcid: 2,
            sdu_type: 0x01,
            simple_extended_content: false,
            remote_request_substitution: false,
            dlc: 63,
            fault_injection: false,
        });
        d.payload = TxPayload::XlContainer {
            acceptance: 0xcafe_f00d,
            address: 0x2000_2000,
        };
        d.binding = QueueBinding::Priority { slot: 30 };
        d.rolling_counter = 0;
        d.wrap = false;
        assert_eq!(TxDescriptor::decode(&d.encode()), Ok(d));
    }

    #[test]
    fn control_bit_positions() {
        let words = descriptor().to_words();
        let tic1 = words[0];
        assert_ne!(tic1 & (1 << 31), 0); // VALID
        assert_ne!(tic1 & (1 << 30), 0); // HD
        assert_ne!(tic1 & (1 << 29), 0); // WRAP
        assert_ne!(tic1 & (1 << 27), 0); // IRQ
        assert_eq!(tic1 & (1 << 26), 0); // PQ clear for FIFO binding
        assert_eq!((tic1 >> 4) & 0x1f, 17); // RC
        assert_eq!((tic1 >> 12) & 0x7, 5); // FQN
        let tic2 = words[1];
        assert_eq!((tic2 >> 13) & 0x7, 3); // IN
        assert_eq!((tic2 >> 16) & 0x3ff, 2); // SIZE
        assert_eq!(tic2 & (1 << 26), 0); // PLSRC clear for inline payload
    }

    #[test]
    fn priority_binding_uses_five_bit_slot() {
        let mut d = descriptor();
        d.binding = QueueBinding::Priority { slot: 31 };
        d.wrap = false;
        let tic1 = d.to_words()[0];
        assert_ne!(tic1 & (1 << 26), 0); // PQ
        assert_eq!((tic1 >> 11) & 0x1f, 31); // PQSN
    }

    #[test]
    fn crc_covers_all_but_the_crc_field() {
        let crc = Crc9::default();
        let mut d = descriptor();
        let reference = d.compute_crc(&crc);
        d.crc = 0x155;
        // Changing the CRC field itself must not change the computation.
        assert_eq!(d.compute_crc(&crc), reference);
        d.size_words += 1;
        assert_ne!(d.compute_crc(&crc), reference);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            TxDescriptor::decode(&[0; TX_DESCRIPTOR_BYTES - 1]),
            Err(MalformedDescriptor)
        );
        assert_eq!(
            TxDescriptor::decode(&[0; TX_DESCRIPTOR_BYTES + 4]),
            Err(MalformedDescriptor)
        );
    }

    #[test]
    fn decode_rejects_undefined_status() {
        let mut words = descriptor().to_words();
        words[0] |= 0b0111; // not a defined STS code
        assert_eq!(TxDescriptor::from_words(words), Err(MalformedDescriptor));
    }

    #[test]
    fn memory_round_trip() {
        struct Ram([u32; 16]);
        impl Memory for Ram {
            fn read_word(&self, address: u32) -> u32 {
                self.0[(address / 4) as usize]
            }
            fn write_word(&mut self, address: u32, word: u32) {
                self.0[(address / 4) as usize] = word;
            }
        }
        let mut ram = Ram([0; 16]);
        let d = descriptor();
        d.write_to(&mut ram, 0x20);
        assert_eq!(TxDescriptor::read_from(&ram, 0x20), Ok(d));
    }
}
