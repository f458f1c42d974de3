//! Execution queue, capture wrapper and execution collector for the `torero`
//! automation CLI.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod executor;
pub mod inputs;
pub mod models;
pub mod paths;
pub mod queue;
pub mod repository;
pub mod services;

#[cfg(test)]
mod test_support;
