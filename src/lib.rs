//! `cenace-demand` library crate.
//!
//! The binary (`cenace`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes or touching the network
//! - the pipeline can be driven from other front-ends (schedulers, notebooks)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
