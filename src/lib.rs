//! Transaction lifecycle engine for municipal finance approvals.
//!
//! Three pieces make up the core: [`matcher`] decides which budget rows a user may
//! pick, [`code`] builds the eleven-segment unique transaction code, and the
//! [`status`]/[`transaction`] pair enforces the level-gated approval workflow.
//! [`service::TransactionService`] ties them to sled-backed storage.

pub mod budget;
pub mod code;
pub mod config;
pub mod error;
pub mod matcher;
pub mod sequence;
pub mod service;
pub mod status;
pub mod store;
pub mod transaction;
pub mod types;
pub mod utils;

pub use error::{EngineError, ErrorKind, PatternError, ValidationError};
