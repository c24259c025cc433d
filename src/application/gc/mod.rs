//! Background collection of unreferenced storage
//!
//! [`OrphanReaper`] is driven by an external schedule (the `reap` command or
//! a spawned [`OrphanReaper::run`] loop), never by request handling.

pub mod collectors;
pub mod config;
pub mod results;
pub mod scheduler;
pub mod worker;

pub use collectors::GcError;
pub use config::ReaperConfig;
pub use results::{ReaperStatistics, SweepReport};
pub use scheduler::TaskScheduler;
pub use worker::OrphanReaper;
