//! Shared types for talking to a Fuel asset repository.
//!
//! Nothing in here performs I/O. The [`identifier`] module holds the
//! canonical `(server, owner, name)` address of an asset, [`error`] the
//! discriminated failure kinds every client operation reports, and
//! [`protocol`] the values exchanged with the transport collaborator.

pub mod error;
pub mod identifier;
pub mod protocol;

pub use error::{FuelError, FuelResult};
pub use identifier::{AssetKind, Identifier, ServerConfig};
pub use protocol::CacheStatus;
