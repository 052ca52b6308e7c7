pub mod tasks;

pub use tasks::{ResponseOutcome, StoreEvent, TaskStore};
