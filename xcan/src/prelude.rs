//! Convenience re-exports
//!
//! ```
//! use xcan::prelude::*;
//! ```

pub use crate::tx_scan::ScanPolicy as _;
pub use xcan_core::EventSink as _;
pub use xcan_core::Memory as _;
pub use xcan_core::ProtocolController as _;
