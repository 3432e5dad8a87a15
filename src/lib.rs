// Sukashi watermarking service library

pub mod config;
pub mod error;
pub mod gallery;
pub mod http;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod source;
pub mod storage;
