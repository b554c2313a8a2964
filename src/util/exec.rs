//! Running external tools.

use anyhow::{bail, Context, Result};
use std::process::{Command, Output, Stdio};

/// Build a command from a program and its arguments.
pub fn command<I, S>(program: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Run to completion; return stdout, or fail with the tool's own output.
pub fn run(mut cmd: Command) -> Result<String> {
    let output = capture(&mut cmd)?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    bail!("{}", failure_message(&cmd, &output));
}

/// Run to completion and hand back the raw output, success or not.
pub fn capture(cmd: &mut Command) -> Result<Output> {
    tracing::debug!(command = %describe(cmd), "exec");
    cmd.stdin(Stdio::null())
        .output()
        .with_context(|| format!("run {}", describe(cmd)))
}

pub fn failure_message(cmd: &Command, output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let mut msg = format!("{} failed (exit {})", describe(cmd), code);
    for (label, stream) in [("stdout", stdout.trim_end()), ("stderr", stderr.trim_end())] {
        if !stream.is_empty() {
            msg.push_str(&format!("\n{}: {}", label, stream));
        }
    }
    msg
}

/// Whether `program` can be executed at all.
pub fn available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_returns_stdout() {
        let out = run(command("sh", ["-c", "echo hello"])).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_failure_carries_output() {
        let err = run(command("sh", ["-c", "echo oops >&2; exit 3"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit 3"), "{}", msg);
        assert!(msg.contains("oops"), "{}", msg);
    }

    #[test]
    fn test_failure_keeps_streams_apart() {
        let err = run(command("sh", ["-c", "echo partial; echo broken >&2; exit 1"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\nstdout: partial"), "{}", msg);
        assert!(msg.contains("\nstderr: broken"), "{}", msg);
        assert!(!msg.contains("partialbroken"), "{}", msg);
    }

    #[test]
    fn test_missing_program() {
        assert!(run(command("definitely-not-a-real-binary-xyz", ["a"])).is_err());
        assert!(!available("definitely-not-a-real-binary-xyz"));
    }
}
