//! TX and RX message descriptors
//!
//! Descriptors are the unit of work handed between software and the Message
//! Handler. Both shapes are fixed-size, word-aligned records: a TX descriptor
//! occupies 8 words, an RX descriptor 4. This module holds what the two
//! shapes share; the word layouts live in [`tx`] and [`rx`].

pub mod rx;
pub mod tx;

pub use rx::RxDescriptor;
pub use tx::TxDescriptor;

/// Byte slice length or field content does not form a valid descriptor
#[derive(Debug, PartialEq, Eq)]
pub struct MalformedDescriptor;

/// Outcome of a TX descriptor written back by the Message Handler
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet completed; software must initialize the field to this value
    #[default]
    None,
    /// Message sent successfully
    MessageSentSuccess,
    /// Message not sent after the configured number of trials
    MessageNotSent,
    /// Message skipped due to a header fetch issue
    MessageSkipped,
    /// Message rejected by the TX filter
    MessageRejected,
    /// Acknowledge data carried a parity error
    AckWithError,
}

impl TxStatus {
    pub(crate) fn to_bits(self) -> u32 {
        match self {
            TxStatus::None => 0b0000,
            TxStatus::MessageSentSuccess => 0b0001,
            TxStatus::MessageNotSent => 0b0010,
            TxStatus::MessageSkipped => 0b0011,
            TxStatus::MessageRejected => 0b0100,
            TxStatus::AckWithError => 0b1111,
        }
    }

    pub(crate) fn from_bits(bits: u32) -> Result<Self, MalformedDescriptor> {
        match bits & 0xf {
            0b0000 => Ok(TxStatus::None),
            0b0001 => Ok(TxStatus::MessageSentSuccess),
            0b0010 => Ok(TxStatus::MessageNotSent),
            0b0011 => Ok(TxStatus::MessageSkipped),
            0b0100 => Ok(TxStatus::MessageRejected),
            0b1111 => Ok(TxStatus::AckWithError),
            _ => Err(MalformedDescriptor),
        }
    }
}

/// Outcome of an RX descriptor written back by the Message Handler
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RxStatus {
    /// Not yet completed; software must initialize the field to this value
    #[default]
    None,
    /// Message received successfully
    MessageReceiveSuccess,
    /// Message received but not filtered
    MessageNotFiltered,
    /// Acknowledge data carried a parity error
    AckWithError,
}

impl RxStatus {
    pub(crate) fn to_bits(self) -> u32 {
        match self {
            RxStatus::None => 0b0000,
            RxStatus::MessageReceiveSuccess => 0b0001,
            RxStatus::MessageNotFiltered => 0b0010,
            RxStatus::AckWithError => 0b1111,
        }
    }

    pub(crate) fn from_bits(bits: u32) -> Result<Self, MalformedDescriptor> {
        match bits & 0xf {
            0b0000 => Ok(RxStatus::None),
            0b0001 => Ok(RxStatus::MessageReceiveSuccess),
            0b0010 => Ok(RxStatus::MessageNotFiltered),
            0b1111 => Ok(RxStatus::AckWithError),
            _ => Err(MalformedDescriptor),
        }
    }
}

impl From<xcan_core::WireOutcome> for TxStatus {
    fn from(outcome: xcan_core::WireOutcome) -> Self {
        match outcome {
            xcan_core::WireOutcome::Sent => TxStatus::MessageSentSuccess,
            xcan_core::WireOutcome::NotSent => TxStatus::MessageNotSent,
            xcan_core::WireOutcome::AckWithError => TxStatus::AckWithError,
        }
    }
}

/// Default generator polynomial for the 9-bit descriptor CRC
pub const DESCRIPTOR_CRC_POLY: u16 = 0x12f;

/// 9-bit CRC over a descriptor's encoded bytes.
///
/// The check covers every descriptor element with the CRC field itself forced
/// to zero; [`tx::TxDescriptor::compute_crc`] and
/// [`rx::RxDescriptor::compute_crc`] handle the zeroing. The generator
/// polynomial is a parameter so that integrations and tests can substitute
/// reference vectors for the one their hardware revision documents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crc9 {
    poly: u16,
}

impl Crc9 {
    /// A checker using `poly` as the generator polynomial (low 9 bits).
    pub const fn with_poly(poly: u16) -> Self {
        Self { poly: poly & 0x1ff }
    }

    /// Computes the CRC over `data`, MSB first, zero initial value.
    pub fn compute(&self, data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            for bit in (0..8).rev() {
                let input = (byte >> bit) as u16 & 1;
                let feedback = (crc >> 8) & 1 != input;
                crc = (crc << 1) & 0x1ff;
                if feedback {
                    crc ^= self.poly;
                }
            }
        }
        crc
    }
}

impl Default for Crc9 {
    fn default() -> Self {
        Self::with_poly(DESCRIPTOR_CRC_POLY)
    }
}

/// Encodes descriptor words to little-endian bytes.
pub(crate) fn words_to_bytes<const W: usize, const B: usize>(words: &[u32; W]) -> [u8; B] {
    let mut bytes = [0; B];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian bytes to descriptor words. The caller checks length.
pub(crate) fn bytes_to_words<const W: usize>(bytes: &[u8]) -> [u32; W] {
    let mut words = [0; W];
    for (chunk, word) in bytes.chunks_exact(4).zip(words.iter_mut()) {
        let mut le = [0; 4];
        le.copy_from_slice(chunk);
        *word = u32::from_le_bytes(le);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_is_nine_bits() {
        let crc = Crc9::default();
        let value = crc.compute(&[0xff; 32]);
        assert!(value <= 0x1ff);
    }

    #[test]
    fn crc_detects_single_bit_flips() {
        let crc = Crc9::default();
        let mut data = [0x5au8; 16];
        let reference = crc.compute(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                data[byte] ^= 1 << bit;
                assert_ne!(crc.compute(&data), reference, "flip {byte}:{bit} undetected");
                data[byte] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn crc_polynomial_is_pluggable() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let a = Crc9::with_poly(0x12f).compute(&data);
        let b = Crc9::with_poly(0x1e7).compute(&data);
        assert_ne!(a, b);
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            TxStatus::None,
            TxStatus::MessageSentSuccess,
            TxStatus::MessageNotSent,
            TxStatus::MessageSkipped,
            TxStatus::MessageRejected,
            TxStatus::AckWithError,
        ] {
            assert_eq!(TxStatus::from_bits(status.to_bits()), Ok(status));
        }
        assert_eq!(TxStatus::from_bits(0b0101), Err(MalformedDescriptor));
        assert_eq!(RxStatus::from_bits(0b0011), Err(MalformedDescriptor));
    }
}
