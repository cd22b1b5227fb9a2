//! Integration tests for the scheduler
//!
//! Most tests drive a full `Crawler` with scripted fetchers and producers on
//! a paused tokio clock; `http_tests` goes through the real HTTP fetcher
//! against a wiremock server.

mod common;
mod http_tests;
mod scheduler_tests;
