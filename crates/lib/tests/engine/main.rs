//! Integration tests for the public busy-lib API.

mod common;

mod active_tests;
mod jobs_tests;
mod project_tests;
mod refs_tests;
