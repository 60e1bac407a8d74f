//! Pipe transport: spawns the server as a child process and exchanges
//! newline-delimited JSON over its stdin/stdout.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use relaybot_core::config::{McpServerConfig, TransportKind};

use super::Transport;
use crate::error::McpError;

pub struct StdioTransport {
    server: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn `config.command` with `config.args`.
    ///
    /// The child inherits the parent environment plus the non-empty entries
    /// of `config.env`; stderr is passed through so server logs stay visible.
    pub fn spawn(server: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let command = config.command.as_deref().ok_or_else(|| McpError::Config {
            server: server.to_string(),
            reason: "stdio transport requires `command`".into(),
        })?;

        let mut child = Command::new(command)
            .args(&config.args)
            .envs(config.clean_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::connection(server, format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::connection(server, "child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::connection(server, "child stdout unavailable"))?;

        debug!(server = %server, command = %command, pid = ?child.id(), "Spawned tool-server");

        Ok(Self {
            server: server.to_string(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: &Value) -> Result<(), McpError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| McpError::Protocol(e.to_string()))?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::connection(&self.server, format!("failed to write to stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::connection(&self.server, format!("failed to flush stdin: {e}")))
    }

    async fn receive(&self) -> Result<Option<Value>, McpError> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::connection(&self.server, format!("failed to read stdout: {e}")))?;
            if read == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => return Ok(Some(value)),
                // Servers sometimes print banners or logs on stdout.
                Err(e) => warn!(server = %self.server, error = %e, line = %trimmed, "Skipping non-JSON line"),
            }
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        child
            .kill()
            .await
            .map_err(|e| McpError::connection(&self.server, format!("failed to kill child: {e}")))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> McpServerConfig {
        McpServerConfig {
            enabled: true,
            command: Some("sh".into()),
            args: vec!["-c".into(), script.into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_cat() {
        let transport = StdioTransport::spawn("cat", &shell("cat")).unwrap();

        let message = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        transport.send(&message).await.unwrap();
        assert_eq!(transport.receive().await.unwrap(), Some(message));

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_skips_non_json_lines() {
        let transport = StdioTransport::spawn(
            "noisy",
            &shell(r#"echo "server starting..."; echo; echo '{"jsonrpc":"2.0","id":5,"result":{}}'"#),
        )
        .unwrap();

        let value = transport.receive().await.unwrap().unwrap();
        assert_eq!(value["id"], 5);
        // Process exited → end of stream
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_env_is_cleaned_and_inherited() {
        let mut cfg = shell(r#"printf '{"token":"%s","empty":"%s","path_set":%s}\n' "$RB_TOKEN" "${RB_EMPTY-unset}" "$( [ -n "$PATH" ] && echo true || echo false )""#);
        cfg.env.insert("RB_TOKEN".into(), "abc".into());
        cfg.env.insert("RB_EMPTY".into(), "".into());

        let transport = StdioTransport::spawn("env", &cfg).unwrap();
        let value = transport.receive().await.unwrap().unwrap();
        assert_eq!(value["token"], "abc");
        assert_eq!(value["empty"], "unset");
        assert_eq!(value["path_set"], true);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let cfg = McpServerConfig {
            command: Some("/nonexistent/relaybot-tool-server".into()),
            ..Default::default()
        };
        let err = StdioTransport::spawn("ghost", &cfg).err().unwrap();
        assert!(matches!(err, McpError::Connection { .. }));
    }
}
