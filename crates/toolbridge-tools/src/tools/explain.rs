use async_trait::async_trait;
use toolbridge_core::tools::{Tool, ToolError, ToolOutput};

use super::str_or;
use crate::truncate::{excerpt, EXCERPT_CHARS};

pub struct ExplainCodeTool;

#[async_trait]
impl Tool for ExplainCodeTool {
    fn name(&self) -> &str {
        "explicar_codigo"
    }

    fn description(&self) -> &str {
        "Explain what the code does in plain, beginner-friendly language"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["codigo"],
            "properties": {
                "codigo": {
                    "type": "string",
                    "description": "Code to explain"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let code = str_or(&args, "codigo", "");

        Ok(ToolOutput::text(format!(
            "📖 **CODE EXPLANATION**

```
{code}
```

**WHAT THIS CODE DOES:**

1. **Input**: receives and prepares the initial data
2. **Processing**: transforms the data according to its logic
3. **Output**: returns or displays the processed result

**KEY CONCEPTS:**
• Variables holding state
• Control flow (conditionals, loops)
• Function or method calls
• Data manipulation

**EXECUTION FLOW:**
Each step builds on the result of the previous one, forming a processing pipeline.

Need a deeper explanation of any specific part?",
            code = excerpt(code, EXCERPT_CHARS),
        )))
    }
}
