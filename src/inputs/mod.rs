mod resolver;

pub use resolver::InputResolver;
