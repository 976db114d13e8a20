pub mod client;
pub mod clone;
pub mod config;
pub mod encryption;
pub mod error;
pub mod job;
pub mod maintainers;
pub mod manage;
pub mod monitoring;
pub mod oauth;
pub mod orchestrator;
pub mod outcome;
pub mod portal;
pub mod region;
pub mod session;
pub mod storage;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod fake;

pub use error::{ErrorKind, KbcError, Result};
