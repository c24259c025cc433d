//! # disk_engine - Content-Addressed Storage Engine
//!
//! The storage core of a multi-tenant personal cloud drive: deduplicated
//! blobs, resumable chunked uploads, distributed leases and per-owner quota
//! accounting, built on Clean Architecture principles.
//!
//! ## Architecture Layers
//!
//! - **Domain**: entities, value objects and domain errors
//! - **Application**: ports, the storage services, the upload use case and
//!   the orphan reaper
//! - **Infrastructure**: filesystem storage, Postgres and in-memory adapters
//!
//! ## Key Guarantees
//!
//! - At most one physical copy per content hash
//! - Bytes are verified against their declared hash before becoming visible
//! - Conflicting operations are serialized by leases shared across instances
//! - Cached quota views heal themselves from the authoritative record
//!
//! ## Example Usage
//!
//! ```no_run
//! use disk_engine::{ApplicationBuilder, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let engine = ApplicationBuilder::new(Config::from_env())
//!     .with_database()
//!     .await?
//!     .with_infrastructure()
//!     .await?
//!     .build()?;
//!
//! let report = engine.reaper.sweep().await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::builder::{ApplicationBuilder, Engine};
pub use application::{ports, services, use_cases, ErrorKind};
pub use config::{Config, MetadataBackend};
pub use domain::errors as domain_errors;
pub use domain::{entities, value_objects};
