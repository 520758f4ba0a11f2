//! Settings, on-disk layout and the deployment record store

pub mod firebase;
pub mod layout;
pub mod paths;
pub mod records;
pub mod settings;
pub mod store;
