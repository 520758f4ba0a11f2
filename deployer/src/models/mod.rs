//! Data models persisted in the record store

pub mod approval;
pub mod cache;
pub mod deployment;
pub mod notification;
