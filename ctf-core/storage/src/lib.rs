mod connection;
mod error;
mod models;
mod repositories;

pub use connection::StorageManager;
pub use error::{Result, StorageError};
pub use models::*;
pub use repositories::*;
