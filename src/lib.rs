pub mod bootstrap;
pub mod common;
pub mod config;
pub mod server;

// Layered boundaries: domain shapes, application ports, infrastructure adapters
pub mod app;
pub mod domain;
pub mod infra;

pub mod observability;
pub mod pipeline;
