//! Utility types and functions shared by the rigging modules.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Transform`] / [`Vector`] - Math types built on glam

mod error;
mod math;

pub use error::*;
pub use math::*;
