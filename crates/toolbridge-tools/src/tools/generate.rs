use async_trait::async_trait;
use toolbridge_core::tools::{Tool, ToolError, ToolOutput};

use super::str_or;

/// Scaffolds a starting point from a description. Unsupported languages get
/// the python template.
pub struct GenerateCodeTool;

fn scaffold(language: &str, description: &str) -> String {
    match language.to_lowercase().as_str() {
        "javascript" => format!(
            "// {description}
function solution() {{
    const result = [];

    data.forEach(item => {{
        if (condition(item)) {{
            result.push(process(item));
        }}
    }});

    return result;
}}

console.log(solution());"
        ),
        "html" => format!(
            "<!-- {description} -->
<!DOCTYPE html>
<html lang=\"en\">
<head>
    <meta charset=\"UTF-8\">
    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">
    <title>Solution</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .container {{ max-width: 800px; margin: 0 auto; }}
    </style>
</head>
<body>
    <div class=\"container\">
        <h1>Result</h1>
        <div id=\"output\"></div>
    </div>
    <script>
        document.getElementById('output').textContent = 'Implementation';
    </script>
</body>
</html>"
        ),
        "sql" => format!(
            "-- {description}
SELECT
    columns
FROM table_name
WHERE condition = true
GROUP BY group_column
ORDER BY order_column DESC
LIMIT 100;"
        ),
        _ => format!(
            "# {description}
def solution():
    result = []

    for item in data:
        if condition(item):
            result.append(process(item))

    return result


if __name__ == \"__main__\":
    print(solution())"
        ),
    }
}

#[async_trait]
impl Tool for GenerateCodeTool {
    fn name(&self) -> &str {
        "gerar_codigo"
    }

    fn description(&self) -> &str {
        "Generate code from a description of what it needs to do"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["descricao", "linguagem"],
            "properties": {
                "descricao": {
                    "type": "string",
                    "description": "Description of what the code should do"
                },
                "linguagem": {
                    "type": "string",
                    "description": "Target language (python, javascript, html, css, sql, etc)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let description = str_or(&args, "descricao", "");
        let language = str_or(&args, "linguagem", "python");

        Ok(ToolOutput::text(format!(
            "✨ **GENERATED CODE - {upper}**

**Description:** {description}

```{language}
{code}
```

**📝 NOTES:**
• Replace `data`, `condition` and `process` with your real values
• Add error handling where needed
• Rename variables to fit your project

**🚀 NEXT STEPS:**
1. Copy the code into your editor
2. Replace the placeholders
3. Try it with sample data
4. Add unit tests

Want an explanation of any part, or tests for it?",
            upper = language.to_uppercase(),
            code = scaffold(language, description),
        )))
    }
}
