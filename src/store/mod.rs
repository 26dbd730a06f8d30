pub mod memory;

pub use memory::{ConsumeError, RequestStore, TransitionError};
