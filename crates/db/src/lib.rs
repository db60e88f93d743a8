//! Driver for the hash index: deterministic key streams, the phased
//! workload, and counter reporting used by the `hashix` binary.

pub mod keys;
pub mod printer;
pub mod workload;
