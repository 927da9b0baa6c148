//! Clock and timestamp helpers

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write;

use super::{Tool, ToolError, ToolResult};

pub const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    CurrentTime,
    FormatTime,
    ParseTime,
}

#[derive(Debug, Deserialize)]
struct TimeArgs {
    operation: Operation,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

/// Current time, formatting and parsing
pub struct TimeTool;

impl TimeTool {
    fn now() -> DateTime<Local> {
        Local::now()
    }
}

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "time_utils"
    }

    fn description(&self) -> &str {
        "Time helpers: current_time (ISO 8601), format_time (current time in a strftime \
         format), parse_time (read `time` using `format` and return ISO 8601)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["current_time", "format_time", "parse_time"]
                },
                "format": {
                    "type": "string",
                    "description": "strftime format, default %Y-%m-%d %H:%M:%S"
                },
                "time": {
                    "type": "string",
                    "description": "Timestamp text for parse_time"
                }
            },
            "required": ["operation"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let args: TimeArgs = serde_json::from_value(args)?;
        let format = args.format.as_deref().unwrap_or(DEFAULT_FORMAT);

        let text = match args.operation {
            Operation::CurrentTime => Self::now().to_rfc3339(),
            Operation::FormatTime => format_with(&Self::now(), format)?,
            Operation::ParseTime => {
                let time = args.time.ok_or_else(|| {
                    ToolError::InvalidArguments("parse_time needs a 'time' value".to_string())
                })?;
                parse_with(&time, format)?
            }
        };
        Ok(ToolResult::Query(Value::String(text)))
    }
}

/// Format without panicking on a bad format string
fn format_with(time: &DateTime<Local>, format: &str) -> Result<String, ToolError> {
    let mut out = String::new();
    write!(out, "{}", time.format(format))
        .map_err(|_| ToolError::InvalidArguments(format!("invalid time format '{}'", format)))?;
    Ok(out)
}

/// Parse a date-time, falling back to a bare date at midnight
fn parse_with(text: &str, format: &str) -> Result<String, ToolError> {
    let text = text.trim();
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(parsed.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, format) {
        return Ok(format!("{}T00:00:00", date.format("%Y-%m-%d")));
    }
    Err(ToolError::Execution(format!(
        "could not parse '{}' with format '{}'",
        text, format
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_time_is_rfc3339() {
        let result = TimeTool.invoke(json!({"operation": "current_time"})).await.unwrap();
        let ToolResult::Query(Value::String(text)) = result else {
            panic!("expected text");
        };
        assert!(DateTime::parse_from_rfc3339(&text).is_ok());
    }

    #[tokio::test]
    async fn test_format_time_default_and_custom() {
        let result = TimeTool.invoke(json!({"operation": "format_time"})).await.unwrap();
        let text = result.render();
        assert!(NaiveDateTime::parse_from_str(&text, DEFAULT_FORMAT).is_ok());

        let year = TimeTool
            .invoke(json!({"operation": "format_time", "format": "%Y"}))
            .await
            .unwrap()
            .render();
        assert_eq!(year.len(), 4);
    }

    #[tokio::test]
    async fn test_parse_time() {
        let result = TimeTool
            .invoke(json!({"operation": "parse_time", "time": "2024-03-05 14:30:00"}))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::query("2024-03-05T14:30:00"));

        let date_only = TimeTool
            .invoke(json!({"operation": "parse_time", "time": "05/03/2024", "format": "%d/%m/%Y"}))
            .await
            .unwrap();
        assert_eq!(date_only, ToolResult::query("2024-03-05T00:00:00"));
    }

    #[tokio::test]
    async fn test_parse_time_errors() {
        let missing = TimeTool.invoke(json!({"operation": "parse_time"})).await;
        assert!(matches!(missing, Err(ToolError::InvalidArguments(_))));

        let garbage = TimeTool
            .invoke(json!({"operation": "parse_time", "time": "yesterday"}))
            .await;
        assert!(matches!(garbage, Err(ToolError::Execution(_))));
    }

    #[test]
    fn test_bad_format_does_not_panic() {
        assert!(format_with(&Local::now(), "%").is_err());
    }
}
