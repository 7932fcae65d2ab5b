pub mod registry;
pub mod tools;
pub mod truncate;

pub use registry::ToolRegistry;
pub use tools::create_default_registry;
