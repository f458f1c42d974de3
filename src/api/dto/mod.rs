pub mod collector;
pub mod inputs;
pub mod queue;
pub mod services;
