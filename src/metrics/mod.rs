pub mod gauges;
pub mod publisher;
pub mod server;

pub use gauges::Gauges;
pub use publisher::Publisher;
