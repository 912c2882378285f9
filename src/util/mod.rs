//! Utility modules: HTTP client construction and header helpers.

pub mod http;
