//! Library half of `torgman-watch`.
//!
//! Split out from the binary so settings parsing and event formatting
//! can be tested without a live backend.

pub mod report;
pub mod settings;
