//! Feed ingestion and article merging.
//!
//! A [`pipeline::Pipeline`] fetches one RSS/Atom feed, scrapes the page
//! behind each entry, merges feed and page fields by fixed priority rules,
//! strips markup from the body and caches new articles idempotently.

pub mod config;
pub mod content;
pub mod feed;
pub mod net;
pub mod pipeline;
pub mod storage;
pub mod util;
