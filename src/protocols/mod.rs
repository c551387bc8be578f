//! # Protocol Plugins
//!
//! Each protocol lives entirely behind the [`crate::tester::Tester`]
//! seam: a request type, a line transformer for the input file, a
//! request executor and the tester wiring them together. The core never
//! learns anything protocol-specific.

pub mod dns;
pub mod http;
pub mod udp;
