// Library for tests to access modules

pub mod board;
pub mod cli;
pub mod config;
pub mod dumper;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod shutdown;
