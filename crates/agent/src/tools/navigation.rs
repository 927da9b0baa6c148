//! Host navigation requests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{Tool, ToolError, ToolResult};

/// Route the host should open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationCommand {
    pub route: String,
}

#[derive(Debug, Deserialize)]
struct NavigationArgs {
    screen: String,
    #[serde(default)]
    subject: Option<String>,
}

/// Asks the host to switch screens. Learning screens need a subject and a
/// signed-in user.
pub struct NavigationTool {
    sender: mpsc::UnboundedSender<NavigationCommand>,
    user_id: Option<String>,
}

impl NavigationTool {
    pub fn new(sender: mpsc::UnboundedSender<NavigationCommand>, user_id: Option<String>) -> Self {
        Self { sender, user_id }
    }

    fn subject_route(&self, screen: &str, subject: Option<String>) -> Result<String, String> {
        let subject = subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} needs a subject", screen))?;
        let user = self
            .user_id
            .as_deref()
            .ok_or_else(|| format!("{} needs a signed-in user", screen))?;
        Ok(format!("{}/{}/{}", screen, subject, user))
    }

    fn route(&self, args: NavigationArgs) -> Result<(String, String), String> {
        match args.screen.as_str() {
            "teaching_outline" => {
                let route = self.subject_route("teaching_outline", args.subject)?;
                Ok((route, "Opening the course outline".to_string()))
            }
            "testing" => {
                let route = self.subject_route("testing", args.subject)?;
                Ok((route, "Opening the practice test".to_string()))
            }
            "profile" => Ok(("profile".to_string(), "Opening your profile".to_string())),
            "view_statistics" => Ok((
                "statistics".to_string(),
                "Opening your learning statistics".to_string(),
            )),
            other => Err(format!(
                "unknown screen '{}'; available: teaching_outline, testing, profile, view_statistics",
                other
            )),
        }
    }
}

#[async_trait]
impl Tool for NavigationTool {
    fn name(&self) -> &str {
        "navigate_to_screen"
    }

    fn description(&self) -> &str {
        "Navigate to a screen: teaching_outline or testing (both need subject), \
         profile, view_statistics."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "screen": {
                    "type": "string",
                    "enum": ["teaching_outline", "testing", "profile", "view_statistics"],
                    "description": "Target screen"
                },
                "subject": {
                    "type": "string",
                    "description": "Subject name, only for teaching_outline and testing"
                }
            },
            "required": ["screen"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let args: NavigationArgs = serde_json::from_value(args)?;
        let (route, message) = match self.route(args) {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(ToolResult::failed(reason)),
        };

        debug!("◆ Navigating to {}", route);
        if self.sender.send(NavigationCommand { route }).is_err() {
            return Ok(ToolResult::failed("navigation is not available"));
        }
        Ok(ToolResult::executed(message))
    }
}
