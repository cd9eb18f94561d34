// Library exports for the logmux service-log multiplexer

pub mod cli;
pub mod config;
pub mod error;
pub mod follow;
pub mod orchestrator;
pub mod scanner;
