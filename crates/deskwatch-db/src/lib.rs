//! # DeskWatch DB
//!
//! Read-only access to a FreeScout help desk database.

pub mod freescout;

pub use freescout::FreeScoutSource;
