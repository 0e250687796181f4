#![no_std]
#![warn(missing_docs)]
//! # X_CAN Message Handler
//!
//! ## Overview
//! This crate implements the descriptor-ring hand-off protocol of the X_CAN
//! Message Handler: the layer that moves CAN frames between software-owned
//! queues in system memory and the protocol controller driving the wire.
//!
//! It provides the following features:
//!
//! - TX and RX descriptor codecs with the exact word layout the hardware
//!   uses, including the 9-bit descriptor CRC
//! - classical CAN, CAN FD and CAN XL frame headers as one tagged type
//! - 8 TX FIFO queues plus the 32-slot TX Priority Queue, with the
//!   VALID-bit ownership protocol and rolling-counter sequencing enforced on
//!   both sides of the hand-off
//! - 8 RX FIFO queues in Normal (per-descriptor container slice) and
//!   Continuous (shared container, read-pointer driven) modes
//! - the TX-Scan candidate arbiter with an injectable ranking policy
//! - structured events for completions, fetch errors and container overflow
//!
//! The platform supplies what the Message Handler does not own through the
//! [`xcan_core`] traits: system memory access ([`xcan_core::Memory`]), the
//! protocol controller ([`xcan_core::ProtocolController`]) and the event
//! sink ([`xcan_core::EventSink`]).
//!
//! ## Ownership protocol
//!
//! Every descriptor slot is shared by exactly two actors and handed back and
//! forth through its VALID bit: software prepares a descriptor, sets VALID
//! and must not touch the slot again until the consumer has written the
//! outcome back and cleared VALID on the header descriptor. The queues
//! police this: fetching a slot whose VALID bit is clear, a gap in the
//! per-queue rolling counter, a CRC mismatch or a foreign instance number
//! all stall the queue and surface as [`events::Event`] values.
//!
//! ## Usage example
//!
//! ```no_run
//! use vcell::VolatileCell;
//! use xcan::config::{MhConfig, TxFifoConfig};
//! use xcan::descriptor::tx::{TxDescriptor, TxPayload};
//! use xcan::descriptor::TxStatus;
//! use xcan::embedded_can::{Id, StandardId};
//! use xcan::mem::SharedRam;
//! use xcan::message::{ClassicHeader, Header};
//! use xcan::tx_fifo::TxFifoQueue;
//!
//! let cells: [VolatileCell<u32>; 64] = core::array::from_fn(|_| VolatileCell::new(0));
//! let mut ram = SharedRam::new(0x2000_0000, &cells);
//! let mut events = |event: xcan::events::Event| {
//!     // route to interrupt handling / logging
//!     let _ = event;
//! };
//!
//! let mh = MhConfig::default();
//! let mut queue = TxFifoQueue::new(0, &mh);
//! queue
//!     .configure(TxFifoConfig {
//!         start_address: 0x2000_0000,
//!         max_desc: 4,
//!     })
//!     .unwrap();
//! queue.start().unwrap();
//!
//! // Software side: hand a frame over.
//! let header = Header::Classic(ClassicHeader {
//!     id: Id::Standard(StandardId::new(0x42).unwrap()),
//!     dlc: 2,
//!     remote: false,
//!     fault_injection: false,
//! });
//! let descriptor = TxDescriptor::new(header, TxPayload::Inline { td0: 0xBEEF, td1: 0 });
//! let slot = queue.claim(&mut ram, descriptor).unwrap();
//!
//! // Consumer side, normally driven by the TX-Scan report:
//! let fetched = queue.fetch(&ram, &mut events).unwrap();
//! // ... hand `fetched` to the protocol controller ...
//! queue
//!     .complete(&mut ram, TxStatus::MessageSentSuccess, 0, &mut events)
//!     .unwrap();
//!
//! // Software side: the outcome is in the descriptor once VALID is clear.
//! let done = queue.read_back(&ram, slot).unwrap();
//! assert_eq!(done.status, TxStatus::MessageSentSuccess);
//! ```

pub mod config;
pub mod descriptor;
pub mod events;
pub mod mem;
pub mod message;
pub mod ownership;
pub mod prelude;
pub mod ring;
pub mod rx_fifo;
pub mod tx_fifo;
pub mod tx_priority;
pub mod tx_scan;

pub use embedded_can;
pub use xcan_core as core;

#[cfg(test)]
extern crate std;
