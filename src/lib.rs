//! Timing model of a TLB sitting between a request generator and a load/store unit.

pub mod config;
pub mod sim;
