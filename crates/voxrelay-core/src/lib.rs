//! Core types, config, errors, and session model for voxrelay.

pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod session;
