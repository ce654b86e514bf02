//! Core domain types for the fragment loader.
//!
//! This module contains pure data types with no transport dependencies:
//! - Fragment names, HTTP methods and fetch descriptors
//! - Per-fetch errors and per-slot outcomes
//! - Batch identifiers, failures and reports

pub mod fragment;
pub mod outcome;

pub use fragment::{ENVELOPE_FIELD, FetchDescriptor, FragmentName, JSON_CONTENT_TYPE, Method};
pub use outcome::{
    BatchFailure, BatchId, BatchReport, FailedEntry, FetchError, FetchOutcome, Loaded,
};
