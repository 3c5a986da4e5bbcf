//! Background Tasks Module
//!
//! Contains background tasks that run periodically during daemon operation.
//!
//! # Tasks
//! - Cleanup: sweeps expired and corrupted entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
