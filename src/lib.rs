//! Telegram Relay - Rust forwarding daemon
//!
//! This daemon polls configured source channels for fresh messages and
//! relays them to paired target channels, stripping a known signature tag
//! before re-posting. One forwarding loop runs per configured pair.

pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod forward;
pub mod resolver;

pub use error::{Error, Result};
