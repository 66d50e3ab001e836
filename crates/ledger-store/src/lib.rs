pub mod index;
pub mod log;
pub mod store;

pub use index::Indices;
pub use log::{Log, OpenOutcome};
pub use store::RecordStore;
