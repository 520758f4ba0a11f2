//! Build and deploy pipeline building blocks

pub mod builder;
pub mod command;
pub mod fsm;
pub mod hosting;
pub mod stage_log;
pub mod tracker;
