//! Testing utilities and mock implementations
//!
//! Mock clock, link, HTTP transport, debug sink and system probe for driving
//! a node without a radio or a network.

pub mod mocks;

pub use mocks::*;
