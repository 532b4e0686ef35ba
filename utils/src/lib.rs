#[cfg(feature = "context")]
pub mod context;
#[cfg(feature = "database")]
pub mod database;
