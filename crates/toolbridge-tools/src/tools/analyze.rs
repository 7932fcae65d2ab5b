use async_trait::async_trait;
use toolbridge_core::tools::{Tool, ToolError, ToolOutput};

use super::str_or;
use crate::truncate::{excerpt, EXCERPT_CHARS};

/// Static review checklist for a code snippet.
pub struct AnalyzeCodeTool;

#[async_trait]
impl Tool for AnalyzeCodeTool {
    fn name(&self) -> &str {
        "analisar_codigo"
    }

    fn description(&self) -> &str {
        "Analyze code to find bugs and suggest improvements and optimizations"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["codigo"],
            "properties": {
                "codigo": {
                    "type": "string",
                    "description": "Code to analyze"
                },
                "linguagem": {
                    "type": "string",
                    "description": "Programming language (python, javascript, etc)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let code = str_or(&args, "codigo", "");
        let language = str_or(&args, "linguagem", "python");

        Ok(ToolOutput::text(format!(
            "🔍 **CODE ANALYSIS - {lang}**

```
{code}
```

**🐛 POTENTIAL BUGS:**
• Check exception handling
• Validate inputs before processing
• Look for resource leaks

**⚡ SUGGESTED OPTIMIZATIONS:**
• Prefer comprehensions or iterators over manual loops
• Avoid deeply nested loops
• Stream large datasets instead of loading them whole

**📚 BEST PRACTICES:**
• Add type annotations
• Document public functions
• Follow the language's style guide
• Extract smaller, reusable functions

**🔒 SECURITY:**
• Sanitize user input
• Keep sensitive data out of logs
• Check permissions before critical operations

Want a refactored version of this code?",
            lang = language.to_uppercase(),
            code = excerpt(code, EXCERPT_CHARS),
        )))
    }
}
