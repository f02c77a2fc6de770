//! Strongbox Server
//!
//! Headless vault daemon. Serves the HTTP API, runs the dead man's switch
//! timer and releases recovery material to heirs when the owner goes silent.

pub mod api;
pub mod config;
pub mod daemon;
pub mod hardening;
pub mod trigger;
