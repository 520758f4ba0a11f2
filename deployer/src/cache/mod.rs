//! Caches

pub mod build;
