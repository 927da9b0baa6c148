//! String operations

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Uppercase,
    Lowercase,
    Reverse,
    Length,
}

#[derive(Debug, Deserialize)]
struct StringArgs {
    operation: Operation,
    text: String,
}

/// Case conversion, reversal and length
pub struct StringTool;

#[async_trait]
impl Tool for StringTool {
    fn name(&self) -> &str {
        "string_processor"
    }

    fn description(&self) -> &str {
        "Process text: convert case, reverse it, or count its characters."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "Operation to apply",
                    "enum": ["uppercase", "lowercase", "reverse", "length"]
                },
                "text": { "type": "string", "description": "Text to process" }
            },
            "required": ["operation", "text"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let args: StringArgs = serde_json::from_value(args)?;
        let result = match args.operation {
            Operation::Uppercase => json!(args.text.to_uppercase()),
            Operation::Lowercase => json!(args.text.to_lowercase()),
            Operation::Reverse => json!(args.text.chars().rev().collect::<String>()),
            Operation::Length => json!(args.text.chars().count()),
        };
        Ok(ToolResult::Query(result))
    }
}
