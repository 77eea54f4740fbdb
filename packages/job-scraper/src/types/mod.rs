//! Domain types.

pub mod config;
pub mod counts;
pub mod dataset;
pub mod job;
pub mod page;
pub mod posted;
pub mod run;
pub mod target;
