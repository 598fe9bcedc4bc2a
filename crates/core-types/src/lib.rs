pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::SignalType;
pub use error::CoreError;
pub use structs::{signal_collection_key, Bar, RawTick, Signal};
