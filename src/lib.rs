//! Streamforged - media streaming server
//!
//! This library crate exposes the core functionality for integration testing.

pub mod access;
pub mod config;
pub mod library;
pub mod players;
pub mod server;
pub mod stats;
pub mod streaming;
pub mod transcoding;
