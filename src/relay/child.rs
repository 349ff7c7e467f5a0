//! Child process that produces the relayed byte stream.

use super::error::RelayError;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Read side of the child's output.
#[derive(Debug)]
pub enum ChildOutput {
    /// Stdout only; stderr goes to the relay's own stderr.
    Stdout(ChildStdout),
    /// One pipe written by both stdout and stderr, in the order the child
    /// wrote them.
    #[cfg(unix)]
    Merged(tokio::net::unix::pipe::Receiver),
}

impl AsyncRead for ChildOutput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ChildOutput::Stdout(stdout) => Pin::new(stdout).poll_read(cx, buf),
            #[cfg(unix)]
            ChildOutput::Merged(pipe) => Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

/// Start `command` with its output captured.
///
/// Stdin is closed. With `merge_stderr` both output streams share one pipe;
/// otherwise stderr is left on the relay's own stderr. The child is killed if
/// its handle is dropped.
pub fn spawn(command: &[String], merge_stderr: bool) -> Result<(Child, ChildOutput), RelayError> {
    let Some((program, args)) = command.split_first() else {
        return Err(RelayError::Spawn {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    if merge_stderr {
        spawn_merged(cmd, program)
    } else {
        spawn_separate(cmd, program)
    }
}

#[cfg(unix)]
fn spawn_merged(mut cmd: Command, program: &str) -> Result<(Child, ChildOutput), RelayError> {
    let (reader, writer) = io::pipe().map_err(spawn_error(program))?;
    let writer_err = writer.try_clone().map_err(spawn_error(program))?;
    cmd.stdout(writer).stderr(writer_err);

    let child = cmd.spawn().map_err(spawn_error(program))?;
    // The parent's copies of the write end must close for EOF to arrive
    drop(cmd);

    let pipe = tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())
        .map_err(spawn_error(program))?;
    debug!(pid = ?child.id(), program = %program, "Spawned child with merged output");
    Ok((child, ChildOutput::Merged(pipe)))
}

#[cfg(not(unix))]
fn spawn_merged(cmd: Command, program: &str) -> Result<(Child, ChildOutput), RelayError> {
    warn!("Merged stderr is not supported on this platform, keeping it separate");
    spawn_separate(cmd, program)
}

fn spawn_separate(mut cmd: Command, program: &str) -> Result<(Child, ChildOutput), RelayError> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
    let mut child = cmd.spawn().map_err(spawn_error(program))?;

    let stdout = child.stdout.take().ok_or_else(|| {
        spawn_error(program)(io::Error::new(
            io::ErrorKind::Other,
            "child stdout was not captured",
        ))
    })?;

    debug!(pid = ?child.id(), program = %program, "Spawned child");
    Ok((child, ChildOutput::Stdout(stdout)))
}

fn spawn_error(program: &str) -> impl Fn(io::Error) -> RelayError + '_ {
    move |source| RelayError::Spawn {
        program: program.to_string(),
        source,
    }
}

/// Reap the child, killing it first if it is still running.
pub async fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            info!(%status, "Child exited");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to poll child status"),
    }

    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to kill child");
        return;
    }
    match child.wait().await {
        Ok(status) => info!(%status, "Child terminated"),
        Err(e) => warn!(error = %e, "Failed to reap child"),
    }
}
