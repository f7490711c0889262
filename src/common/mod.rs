mod config;
mod error;
mod types;

pub use config::*;
pub use error::{DbError, Result};
pub use types::*;
