//! Common test utilities for reagent CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory for one test
pub struct TestEnv {
    pub home: TempDir,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { home: tempdir()? })
    }

    /// `~/.reagent` inside the test home
    pub fn data_dir(&self) -> PathBuf {
        self.home.path().join(".reagent")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir().join("config.json")
    }

    pub fn conversation_file(&self, conversation_id: &str) -> PathBuf {
        self.data_dir()
            .join("conversations")
            .join(format!("{}.json", conversation_id))
    }

    /// The reagent binary, pointed at the test home with no key in the environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_reagent"));
        cmd.env("HOME", self.home.path());
        cmd.env_remove("REAGENT_API_KEY");
        cmd.env_remove("DASHSCOPE_API_KEY");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Write a config pointing the gateway at `api_base`
    pub fn write_config(&self, api_base: &str) -> anyhow::Result<()> {
        let config = serde_json::json!({
            "provider": { "api_key": "test-key", "api_base": api_base },
            "agent": { "defaults": { "name": "tutor" } }
        });
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::write(self.config_file(), serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// Chat completion body answering with plain text
pub fn text_completion(content: &str) -> String {
    serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// Chat completion body requesting one tool call
pub fn tool_completion(name: &str, arguments: serde_json::Value) -> String {
    serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments.to_string() }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
    .to_string()
}
