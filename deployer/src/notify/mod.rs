//! Deployment notifications

pub mod notifier;
