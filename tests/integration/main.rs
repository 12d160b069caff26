//! Integration tests for the crawl resource layer
//!
//! These tests drive the public services end-to-end against real SQLite
//! databases and, for proxy validation, a wiremock echo server.

mod checkpoint_tests;
mod common;
mod pool_tests;
mod proxy_tests;
