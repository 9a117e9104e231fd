pub mod api;
pub mod directory;
pub mod error;
pub mod events;
pub mod models;

pub use error::{ErrorKind, MessagingError};
