//! Service Layer
//!
//! Business logic between the HTTP handlers and the storage, search and
//! sync crates. Handlers stay thin: they convert requests, call a service
//! and shape the response.

mod catalog;
mod index;
mod sync;

pub use catalog::*;
pub use index::*;
pub use sync::*;
