//! blend-deploy library
//!
//! Deployment orchestration for Blend design system hosting targets: build
//! executor, build cache, record store, approval gate and notifications.

pub mod app;
pub mod authn;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;
