pub mod accumulator;
pub mod handoff;

pub use accumulator::Accumulator;
pub use handoff::Handoff;
