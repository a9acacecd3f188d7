//! nucache - generational, snapshot-isolated published content cache
//!
//! Readers pin a generation and see a frozen view of the content tree while
//! a single writer commits change batches as new generations.

pub mod cache_file;
pub mod cli;
pub mod codec;
pub mod collector;
pub mod config;
pub mod content;
pub mod errors;
pub mod observability;
pub mod rebuild;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod writer;
