pub mod collector;
pub mod health;
pub mod inputs;
pub mod queue;
pub mod services;
