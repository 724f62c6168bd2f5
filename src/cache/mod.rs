//! Table cache implementation for open SSTable handles.
//!
//! Provides an LRU (Least Recently Used) cache bounding the number of
//! table files the engine holds open at once.

mod table_cache;

pub use table_cache::{TableCache, TableCacheStats};
