//! Core abstractions for the relay.
//!
//! This module provides the foundational types and traits that every other
//! layer builds on: tag resolution, value classification, the device client
//! seam, errors and logging.

pub mod classify;
pub mod data;
pub mod error;
pub mod logging;
pub mod tag;
pub mod traits;

pub use classify::{classify, Classification};
pub use data::*;
pub use error::{RelayError, Result};
pub use tag::{resolve, TagSet, TagSpec, TagType};
pub use traits::*;
