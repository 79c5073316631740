//! Transform module
//!
//! Maps raw listing children into storage records.
//!
//! # Overview
//!
//! Normalization is pure: no I/O and a single failure mode,
//! [`MalformedItem`], raised when a required field is absent. Malformed items
//! are absorbed here (logged and counted), never propagated to the
//! orchestrator as errors.

mod normalize;

pub use normalize::{normalize, normalize_page, MalformedItem, PERMALINK_BASE};

#[cfg(test)]
mod tests;
