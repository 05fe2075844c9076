//! Local agent for the Seattle Community Network coverage service.
//!
//! A device registers once with a one-time credential: the credential's
//! secrets are bound to the device signing key, sent to the service and kept
//! encrypted on disk. Later runs reload that bundle, check its integrity,
//! run ping and speed tests and upload a report signed with the same key.

pub mod api;
pub mod binding;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod orchestrator;
pub mod picker;
pub mod prompt;
pub mod report;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::error::Error;
