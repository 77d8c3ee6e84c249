//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Sweep and sync: removes expired entries, then flushes the write buffer
//!   and expiry index to disk

mod sync;

pub use sync::spawn_sync_task;
