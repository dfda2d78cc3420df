//! A minimal message board ("shout") service.
//!
//! Clients post short messages attributed to a user, fetch them by id, list
//! every live id, and update or delete single messages. Each module focuses on
//! one responsibility:
//!
//! - [`store`] wraps an embedded redb file: named collections, per-collection
//!   sequence counters, and scoped read/write transactions.
//! - [`keys`] encodes ids as big-endian keys so byte order is numeric order.
//! - [`shout`] defines the record and its JSON codec.
//! - [`repository`] implements save, update, get, list, and delete on top of
//!   the store.
//! - [`pipeline`] holds the middleware every request passes through: panic
//!   recovery, CORS, and user-name extraction.
//! - [`handlers`] maps HTTP routes onto repository calls.
//! - [`cli`] parses the service configuration.
//!
//! Integration tests drive the repository and the router in-process.

pub mod cli;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod pipeline;
pub mod repository;
pub mod shout;
pub mod store;

pub use error::ShoutError;
pub use handlers::{router, AppState};
pub use repository::ShoutRepository;
pub use shout::Shout;
