//! # fuel-tools
//!
//! **Client and local cache for Fuel asset repositories.**
//!
//! A Fuel server hosts named, owned assets (models and worlds). This crate
//! resolves asset identifiers from URLs, fetches metadata and archives over
//! HTTP, and keeps an on-disk cache so repeated requests avoid the network.
//!
//! ## Core Features
//!
//! - **URL Resolution**: Parses `https://<server>/<version>/<owner>/models/<name>`
//!   URLs, version-less URLs and `owner/models/name` unique names.
//! - **Local Caching**: Models are extracted to `<cache>/<owner>/<name>/` through
//!   an atomic staging-and-rename step, so lookups never see partial downloads.
//! - **Degraded Listing**: Listing all models falls back to the cache when the
//!   servers cannot be reached.
//! - **Typed Failures**: Every operation reports a [`FuelError`] kind.
//!
//! ## Usage
//!
//! ```no_run
//! use fuel_tools::FuelClient;
//!
//! #[async_std::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FuelClient::from_env()?;
//!
//!     let path = client
//!         .download_model_url("https://api.ignitionfuel.org/1.0/caguero/models/Beer")
//!         .await?;
//!     println!("Model available at: {:?}", path);
//!
//!     for model in client.models().await {
//!         println!("{}", model);
//!     }
//!     Ok(())
//! }
//! ```

/// The on-disk cache of downloaded models.
pub mod cache;

/// The orchestrating client.
pub mod client;

/// Server list and cache location.
pub mod config;

pub mod json;

/// Parsing of model URLs and unique names.
pub mod resolver;

/// The network boundary.
pub mod transport;

pub use cache::{AssetIter, LocalCache};
pub use client::FuelClient;
pub use config::ClientConfig;
pub use fuel_tools_core::{
    AssetKind, CacheStatus, FuelError, FuelResult, Identifier, ServerConfig,
};
pub use transport::{SurfTransport, Transport};
