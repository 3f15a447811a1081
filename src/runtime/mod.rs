//! # Runtime
//!
//! Controller startup wiring and the coordinator loop.

pub mod initialization;
pub mod sync_loop;

pub use initialization::{initialize, Runtime};
pub use sync_loop::run_sync_loop;
