//! Business Services
//!
//! - `TreeService` - path materialization, moves and tree reads
//!
//! Services coordinate between the database layer and application logic,
//! implementing tree rules over a [`TreeStore`](crate::db::TreeStore).

pub mod error;
mod tree_service;

pub use error::TreeServiceError;
pub use tree_service::TreeService;
