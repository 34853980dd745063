//! Integration tests for brickgate.

pub mod http_test;
pub mod pipeline_test;
pub mod statement_api_test;
