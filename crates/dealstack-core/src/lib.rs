pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "financing")]
pub mod financing;

#[cfg(feature = "waterfall")]
pub mod waterfall;

pub use error::DealStackError;
pub use types::*;

/// Standard result type for all dealstack operations
pub type DealStackResult<T> = Result<T, DealStackError>;
