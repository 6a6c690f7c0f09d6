#[macro_use]
extern crate chan;

pub mod agent;
pub mod alarm;
pub mod config;
pub mod decoder;
pub mod kafka;
pub mod logger;
pub mod notification;
pub mod processor;
pub mod system;
