//! Integration tests for the analysis pipeline
//!
//! These tests use wiremock to create mock HTTP servers and drive fetches
//! and whole jobs end to end.

mod common;
mod fetcher_tests;
mod pipeline_tests;
