//! Types and settings shared by the `mpv-remote` client and the HTTP bridge.

pub mod config;
pub mod platform;
pub mod protocol;
