//! Cycle accurate model of a virtually addressed split instruction/data cache controller.
//!
//! The controller sits between an executor (anything implementing [`iss::Executor`]) and a
//! split transaction interconnect port. It owns two TLBs and a cache per side, a write
//! buffer, and supports load linked/store conditional through the interconnect.

pub mod bench;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod iss;
pub mod packet;
pub mod pte;
pub mod stats;
pub mod tlb;
pub mod write_buffer;
pub mod xtn;

#[cfg(test)]
mod tests;

pub use config::{CacheGeometry, CacheabilityTable, Config, Segment, TlbGeometry};
pub use controller::{Controller, DataState, InsState};
pub use error::{MmuError, ProtocolViolation};
pub use stats::Stats;
