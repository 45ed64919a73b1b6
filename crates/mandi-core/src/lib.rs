//! Core mandi library (backend transport, config, chat stream engine).

pub mod backend;
pub mod config;
pub mod core;
