//! Integration tests for the daemon's stdin/stdout protocol

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

struct Daemon {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    _dir: TempDir,
}

impl Daemon {
    fn spawn(config: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("daemon.toml");
        std::fs::write(&path, config)?;

        let mut child = Command::new(env!("CARGO_BIN_EXE_camerax-daemon"))
            .arg("--config")
            .arg(&path)
            .arg("--log-level")
            .arg("warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn daemon")?;

        let stdin = child.stdin.take().context("no stdin")?;
        let stdout = BufReader::new(child.stdout.take().context("no stdout")?);
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
            _dir: dir,
        })
    }

    fn send(&mut self, command: Value) -> Result<()> {
        let stdin = self.stdin.as_mut().context("stdin closed")?;
        writeln!(stdin, "{}", command)?;
        stdin.flush()?;
        Ok(())
    }

    fn next(&mut self) -> Result<Value> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line)?;
        anyhow::ensure!(read > 0, "daemon closed stdout");
        Ok(serde_json::from_str(&line)?)
    }

    /// Read lines until the reply for `id`, collecting everything else
    fn reply(&mut self, id: u64) -> Result<(Value, Vec<Value>)> {
        let mut others = Vec::new();
        loop {
            let output = self.next()?;
            if output["response"]["id"] == json!(id) {
                return Ok((output["response"].clone(), others));
            }
            others.push(output);
        }
    }

    fn finish(mut self) -> Result<Vec<Value>> {
        drop(self.stdin.take());
        let mut rest = Vec::new();
        while let Ok(output) = self.next() {
            rest.push(output);
        }
        let status = self.child.wait()?;
        anyhow::ensure!(status.success(), "daemon exited with {}", status);
        Ok(rest)
    }
}

fn bind(id: u64, key: i32, facing: &str) -> Value {
    json!({
        "id": id,
        "command": "call",
        "message": {"category": "bind", "key": key, "bindArgs": {"selector": {"facing": facing}}}
    })
}

#[test]
fn test_bind_and_unbind_over_stdio() -> Result<()> {
    let mut daemon = Daemon::spawn("")?;

    daemon.send(bind(1, 5, "back"))?;
    let (reply, mut events) = daemon.reply(1)?;
    assert_eq!(reply["result"], "success");
    assert_eq!(reply["payload"]["hasTorch"], true);

    daemon.send(json!({
        "id": 2,
        "command": "call",
        "message": {"category": "unbind", "key": 5}
    }))?;
    let (reply, more) = daemon.reply(2)?;
    assert_eq!(reply["result"], "success");
    events.extend(more);

    let texture_events: Vec<_> = events
        .iter()
        .filter(|output| output["event"]["category"] == "textureInfoEvent")
        .collect();
    assert_eq!(texture_events.len(), 1);
    assert_eq!(texture_events[0]["event"]["key"], 5);
    assert_eq!(texture_events[0]["event"]["textureInfo"]["size"]["width"], 480);

    daemon.finish()?;
    Ok(())
}

#[test]
fn test_permission_prompt_round_trip() -> Result<()> {
    let mut daemon = Daemon::spawn("[simulator]\npermission_granted = false\n")?;

    daemon.send(bind(1, 1, "front"))?;
    let prompt = loop {
        let output = daemon.next()?;
        if output.get("permissionRequest").is_some() {
            break output;
        }
    };
    assert_eq!(prompt["permissionRequest"]["requestCode"], 3543);

    daemon.send(json!({
        "id": 2,
        "command": "permissionResult",
        "requestCode": 3543,
        "granted": true
    }))?;

    let (reply, _) = daemon.reply(1)?;
    assert_eq!(reply["result"], "success");
    assert_eq!(reply["payload"]["hasTorch"], false);

    daemon.finish()?;
    Ok(())
}

#[test]
fn test_errors_are_reported_as_replies() -> Result<()> {
    let mut daemon = Daemon::spawn("")?;

    daemon.send(json!({
        "id": 1,
        "command": "call",
        "message": {"category": "torch", "key": 9, "torchState": true}
    }))?;
    let (reply, _) = daemon.reply(1)?;
    assert_eq!(reply["result"], "error");
    assert_eq!(reply["code"], "not-found");

    daemon.send(json!({
        "id": 2,
        "command": "call",
        "message": {"category": "analysisEvent", "key": 1}
    }))?;
    let (reply, _) = daemon.reply(2)?;
    assert_eq!(reply["result"], "notImplemented");

    daemon.send(json!({"id": 3, "command": "rotate", "quarterTurns": 9}))?;
    let (reply, _) = daemon.reply(3)?;
    assert_eq!(reply["code"], "invalid-command");

    daemon.finish()?;
    Ok(())
}
