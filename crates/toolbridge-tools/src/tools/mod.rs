pub mod analyze;
pub mod explain;
pub mod generate;
pub mod refactor;

use std::sync::Arc;

use crate::registry::ToolRegistry;

/// Create a ToolRegistry with all built-in tools.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(analyze::AnalyzeCodeTool));
    registry.register(Arc::new(explain::ExplainCodeTool));
    registry.register(Arc::new(generate::GenerateCodeTool));
    registry.register(Arc::new(refactor::RefactorCodeTool));

    registry
}

/// String argument `key`, or `default` when absent or not a string.
///
/// Tools never reject a call over its arguments; they render with defaults.
pub(crate) fn str_or<'a>(args: &'a serde_json::Value, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}
