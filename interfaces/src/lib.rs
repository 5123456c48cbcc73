pub mod defs;
pub mod empty;

pub use defs::FeedSink;
pub use defs::PageRequest;
pub use defs::TransportError;
pub use empty::NullSink;
