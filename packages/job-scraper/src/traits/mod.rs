//! Core trait abstractions for the scraping engine.
//!
//! These traits are the seams between the engine and the outside world:
//! time, HTTP, fetch policy, site-specific parsing and dataset storage.

pub mod clock;
pub mod fetcher;
pub mod parser;
pub mod store;
pub mod transport;
