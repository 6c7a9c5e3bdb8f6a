pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use types::{DurabilityMode, Mapping, sorted_mapping, sorted_value};
