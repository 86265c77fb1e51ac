//! HTTP protocol layer module
//!
//! Response builders and content metadata, independent of upload semantics.

pub mod content;
pub mod response;

// Re-export commonly used builders
pub use response::{
    build_304_response, build_404_response, build_405_response, build_413_response,
    build_file_response, build_options_response, finalize_headers, json_response,
};
