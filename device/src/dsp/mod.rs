//! Signal conditioning for the bounce detector.

pub mod filter;
pub mod threshold;
