//! Access-token credential snapshots and the redacted secret wrapper.

pub mod credential;
pub mod secret;
