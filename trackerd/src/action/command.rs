//! Runs an external command and turns its stdout into events.
//!
//! Each stdout line that parses as a JSON object is emitted as-is; any
//! other non-empty line becomes `{ "message": <line> }`.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use tracker_domain::Settings;
use uuid::Uuid;

use super::registry::{ActionDescriptor, FieldKind, FormField};
use super::{Action, ActionContext};
use crate::error::{DaemonError, DaemonResult};

/// Event source backed by a child process.
pub struct CommandAction {
    uuid: Uuid,
    name: String,
    settings: Settings,
    command: String,
    args: Vec<String>,
    working_dir: Option<String>,
}

impl CommandAction {
    /// Registry metadata.
    pub fn descriptor() -> ActionDescriptor {
        ActionDescriptor {
            type_name: "command",
            label: "Command output",
            description: "Runs a command and creates an event for every line it prints",
            form: vec![
                FormField::required("command", "Command", FieldKind::Text, "Executable to run"),
                FormField::optional("args", "Arguments", FieldKind::List, "Command line arguments"),
                FormField::optional(
                    "working_dir",
                    "Working directory",
                    FieldKind::Text,
                    "Directory the command runs in",
                ),
            ],
        }
    }

    /// Build from settings.
    pub fn create(settings: Settings, uuid: Uuid, name: String) -> DaemonResult<Box<dyn Action>> {
        Ok(Box::new(Self::new(settings, uuid, name)?))
    }

    /// Validate settings and build.
    pub fn new(settings: Settings, uuid: Uuid, name: String) -> DaemonResult<Self> {
        let command = settings.require_str("command").map_err(DaemonError::settings)?;
        if command.trim().is_empty() {
            return Err(DaemonError::Settings("command must not be empty".to_string()));
        }
        let command = command.to_string();
        let args = settings.string_list("args").map_err(DaemonError::settings)?;
        let working_dir = settings
            .optional_str("working_dir")
            .map_err(DaemonError::settings)?
            .map(str::to_string);

        Ok(Self {
            uuid,
            name,
            settings,
            command,
            args,
            working_dir,
        })
    }

    fn spawn(&self) -> DaemonResult<Child> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
            .spawn()
            .map_err(|e| DaemonError::Action(format!("failed to start {}: {}", self.command, e)))
    }
}

/// Turn one output line into an event object.
pub(crate) fn parse_line(line: &str) -> Value {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({ "message": line }),
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill command");
    }
}

#[async_trait]
impl Action for CommandAction {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn run(&self, ctx: ActionContext) -> DaemonResult<()> {
        let mut child = self.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DaemonError::Action("command stdout is not captured".to_string()))?;
        let mut stdout = BufReader::new(stdout);
        let mut buf = Vec::new();
        info!(command = %self.command, pid = ?child.id(), "Command started");

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    terminate(&mut child).await;
                    debug!("Command killed on stop");
                    return Ok(());
                },
                read = stdout.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match ctx.emit(parse_line(trimmed)).await {
                        Ok(()) => {},
                        Err(DaemonError::Shutdown) => {
                            terminate(&mut child).await;
                            return Ok(());
                        },
                        Err(e) => return Err(e),
                    }
                },
                Err(e) => {
                    terminate(&mut child).await;
                    return Err(DaemonError::Action(format!("reading command output: {}", e)));
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DaemonError::Action(format!("waiting for command: {}", e)))?;
        if status.success() {
            info!("Command finished");
            Ok(())
        } else {
            Err(DaemonError::Action(format!("{} exited with {}", self.command, status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::EmittedEvent;
    use tokio::sync::{mpsc, watch};
    use tokio_util::sync::CancellationToken;

    fn shell(script: &str) -> CommandAction {
        let settings = Settings::new()
            .with("command", "sh")
            .with("args", json!(["-c", script]));
        CommandAction::new(settings, Uuid::now_v7(), "shell".to_string()).unwrap()
    }

    fn context(cancel: &CancellationToken) -> (ActionContext, mpsc::Receiver<EmittedEvent>, watch::Sender<bool>) {
        let (paused_tx, paused_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(16);
        let ctx = ActionContext::new(
            Uuid::now_v7(),
            cancel.clone(),
            paused_rx,
            events_tx,
            tracing::Span::none(),
        );
        (ctx, events_rx, paused_tx)
    }

    #[test]
    fn test_parse_line_json_object() {
        assert_eq!(parse_line(r#"{"host_name":"web1"}"#)["host_name"], "web1");
    }

    #[test]
    fn test_parse_line_plain_text() {
        assert_eq!(parse_line("disk full"), json!({ "message": "disk full" }));
        assert_eq!(parse_line("[1,2]"), json!({ "message": "[1,2]" }));
    }

    #[test]
    fn test_requires_command() {
        assert!(CommandAction::new(Settings::new(), Uuid::now_v7(), "x".to_string()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_emits_every_line() {
        let action = shell(r#"echo '{"host_name":"web1","message":"down"}'; echo; echo plain"#);
        let cancel = CancellationToken::new();
        let (ctx, mut events, _paused) = context(&cancel);

        action.run(ctx).await.unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.event["host_name"], "web1");
        assert_eq!(second.event, json!({ "message": "plain" }));
        assert!(events.recv().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_is_kept_lossy() {
        let action = shell(r#"printf 'disk \377 full\n'; echo after"#);
        let cancel = CancellationToken::new();
        let (ctx, mut events, _paused) = context(&cancel);

        action.run(ctx).await.unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.event, json!({ "message": "disk \u{FFFD} full" }));
        assert_eq!(second.event, json!({ "message": "after" }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let action = shell("exit 3");
        let cancel = CancellationToken::new();
        let (ctx, _events, _paused) = context(&cancel);

        assert!(matches!(action.run(ctx).await, Err(DaemonError::Action(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_child() {
        let action = shell("sleep 600");
        let cancel = CancellationToken::new();
        let (ctx, _events, _paused) = context(&cancel);

        let run = tokio::spawn(async move { action.run(ctx).await });
        cancel.cancel();

        run.await.unwrap().unwrap();
    }
}
