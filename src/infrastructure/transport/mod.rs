//! Provider transport implementations

pub mod dto;
pub mod http;

pub use http::HttpTransport;
