pub mod config;
pub mod error;
pub mod error_utils;
pub mod persona;
pub mod retry;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use persona::*;
pub use retry::*;
pub use types::*;
