//! CAN frame headers in the descriptor's representation
//!
//! Words T0 and T1 of a TX descriptor (R0/R1 on the RX side) carry the frame
//! header. The hardware interprets the same two words as one of three
//! overlapping layouts; which one applies is selected by the FDF and XLF
//! discriminant bits in T0. [`Header`] decodes them into exactly one
//! strongly-typed shape instead of exposing all three views at once.

use embedded_can::{ExtendedId, Id, StandardId};

/// Payload does not fit any data length code of the selected frame format
#[derive(Debug, PartialEq, Eq)]
pub struct TooMuchData;

/// Frame header, tagged by the FDF/XLF discriminant bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Header {
    /// Classical CAN 2.0 A/B (`FDF=0`)
    Classic(ClassicHeader),
    /// CAN FD (`FDF=1`, `XLF=0`)
    Fd(FdHeader),
    /// CAN XL (`FDF=1`, `XLF=1`)
    Xl(XlHeader),
}

/// Classical CAN header shape
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClassicHeader {
    /// 11-bit or 29-bit frame identifier
    pub id: Id,
    /// Data length code, 0..=15 (values above 8 mean 8 data bytes)
    pub dlc: u8,
    /// Remote transmission request
    pub remote: bool,
    /// Fault injection request, carried opaquely
    pub fault_injection: bool,
}

/// CAN FD header shape
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FdHeader {
    /// 11-bit or 29-bit frame identifier
    pub id: Id,
    /// Data length code, 0..=15
    pub dlc: u8,
    /// Error state indicator
    pub error_state_indicator: bool,
    /// Parts of the frame are exchanged at the data-phase bit rate
    pub bit_rate_switching: bool,
    /// Fault injection request, carried opaquely
    pub fault_injection: bool,
}

/// CAN XL header shape
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct XlHeader {
    /// 11-bit priority identifier
    pub priority_id: u16,
    /// Virtual CAN network identifier
    pub vcid: u8,
    /// SDU type
    pub sdu_type: u8,
    /// Simple extended content
    pub simple_extended_content: bool,
    /// Remote request substitution
    pub remote_request_substitution: bool,
    /// Data length code with CAN XL encoding, `len - 1`, 0..=2047
    pub dlc: u16,
    /// Fault injection request, carried opaquely
    pub fault_injection: bool,
}

impl Header {
    /// Packs the header into the T0/T1 word pair.
    pub fn to_words(self) -> (u32, u32) {
        match self {
            Header::Classic(h) => {
                let t0 = id_field(h.id); // FDF=0, XLF=0
                let t1 = ((h.dlc as u32 & 0xf) << 16)
                    | ((h.remote as u32) << 26)
                    | ((h.fault_injection as u32) << 30);
                (t0, t1)
            }
            Header::Fd(h) => {
                let t0 = id_field(h.id) | 1 << 31; // FDF
                let t1 = ((h.dlc as u32 & 0xf) << 16)
                    | ((h.error_state_indicator as u32) << 20)
                    | ((h.bit_rate_switching as u32) << 25)
                    | ((h.fault_injection as u32) << 30);
                (t0, t1)
            }
            Header::Xl(h) => {
                let t0 = (h.sdu_type as u32)
                    | (h.vcid as u32) << 8
                    | (h.simple_extended_content as u32) << 16
                    | (h.remote_request_substitution as u32) << 17
                    | (h.priority_id as u32 & 0x7ff) << 18
                    | 1 << 30 // XLF
                    | 1 << 31; // FDF
                let t1 = (h.dlc as u32 & 0x7ff) << 16 | (h.fault_injection as u32) << 30;
                (t0, t1)
            }
        }
    }

    /// Decodes the T0/T1 word pair into the header shape selected by the
    /// discriminant bits. Reserved bits are ignored.
    pub fn from_words(t0: u32, t1: u32) -> Self {
        let fdf = t0 & (1 << 31) != 0;
        let xlf = t0 & (1 << 30) != 0;
        let fault_injection = t1 & (1 << 30) != 0;
        match (fdf, xlf) {
            (false, _) => Header::Classic(ClassicHeader {
                id: decode_id(t0),
                dlc: ((t1 >> 16) & 0xf) as u8,
                remote: t1 & (1 << 26) != 0,
                fault_injection,
            }),
            (true, false) => Header::Fd(FdHeader {
                id: decode_id(t0),
                dlc: ((t1 >> 16) & 0xf) as u8,
                error_state_indicator: t1 & (1 << 20) != 0,
                bit_rate_switching: t1 & (1 << 25) != 0,
                fault_injection,
            }),
            (true, true) => Header::Xl(XlHeader {
                priority_id: ((t0 >> 18) & 0x7ff) as u16,
                vcid: (t0 >> 8) as u8,
                sdu_type: t0 as u8,
                simple_extended_content: t0 & (1 << 16) != 0,
                remote_request_substitution: t0 & (1 << 17) != 0,
                dlc: ((t1 >> 16) & 0x7ff) as u16,
                fault_injection,
            }),
        }
    }

    /// Payload length in bytes implied by the data length code.
    pub fn payload_len(&self) -> usize {
        match self {
            Header::Classic(h) => dlc_to_len(h.dlc, false),
            Header::Fd(h) => dlc_to_len(h.dlc, true),
            Header::Xl(h) => h.dlc as usize + 1,
        }
    }

    /// `true` for CAN XL headers.
    pub fn is_xl(&self) -> bool {
        matches!(self, Header::Xl(_))
    }
}

fn id_field(id: Id) -> u32 {
    match id {
        Id::Standard(id) => (id.as_raw() as u32) << 18,
        Id::Extended(id) => id.as_raw() | (1 << 29), // XTD
    }
}

fn decode_id(t0: u32) -> Id {
    if t0 & (1 << 29) != 0 {
        // The mask ensures the ID is in range for a 29-bit integer
        Id::Extended(unsafe { ExtendedId::new_unchecked(t0 & ExtendedId::MAX.as_raw()) })
    } else {
        // The mask ensures the ID is in range for a 11-bit integer
        Id::Standard(unsafe {
            StandardId::new_unchecked((t0 >> 18) as u16 & StandardId::MAX.as_raw())
        })
    }
}

/// Finds the smallest data length code that encodes at least `len` bytes
pub fn len_to_dlc(len: usize, fd_format: bool) -> Result<u8, TooMuchData> {
    if fd_format {
        match len {
            0..=8 => Ok(len as u8),
            9..=12 => Ok(9),
            13..=16 => Ok(10),
            17..=20 => Ok(11),
            21..=24 => Ok(12),
            25..=32 => Ok(13),
            33..=48 => Ok(14),
            49..=64 => Ok(15),
            _ => Err(TooMuchData),
        }
    } else if len <= 8 {
        Ok(len as u8)
    } else {
        Err(TooMuchData)
    }
}

/// Converts a data length code to a length in bytes
pub fn dlc_to_len(dlc: u8, fd_format: bool) -> usize {
    if fd_format {
        match dlc {
            0..=8 => dlc.into(),
            9 => 12,
            10 => 16,
            11 => 20,
            12 => 24,
            13 => 32,
            14 => 48,
            15.. => 64,
        }
    } else {
        match dlc {
            0..=8 => dlc.into(),
            9.. => 8,
        }
    }
}
