use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe_status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch: {0}")]
    Launch(#[source] io::Error),
    #[error("failed to wait for completion: {0}")]
    Wait(#[source] io::Error),
    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Platform shell invocation of a command line.
pub fn shell_command(cmdline: &str) -> Command {
    if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(cmdline);
        command
    } else {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmdline);
        command
    }
}

/// Runs `command` to completion with captured output, killing it once
/// `timeout` elapses.
///
/// The deadline also covers draining the output pipes, so a backgrounded
/// descendant holding them open cannot outlive `timeout`. On unix the child
/// leads its own process group and the whole group is killed on expiry.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ProcessError::Launch)?;

    let deadline = Instant::now() + timeout;
    let (tx, rx) = mpsc::channel();
    spawn_reader(Stream::Stdout, child.stdout.take(), tx.clone());
    spawn_reader(Stream::Stderr, child.stderr.take(), tx);

    let status = wait_with_deadline(&mut child, deadline, timeout)?;
    let (stdout, stderr) = match collect_output(&rx, deadline) {
        Some(output) => output,
        None => {
            kill_tree(&mut child);
            return Err(ProcessError::TimedOut(timeout));
        }
    };

    Ok(ProcessOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, ProcessError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                kill_tree(child);
                let _ = child.wait();
                return Err(ProcessError::TimedOut(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Err(ProcessError::Wait(err)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Waits for both readers to hit EOF; `None` once `deadline` passes first.
fn collect_output(rx: &Receiver<(Stream, String)>, deadline: Instant) -> Option<(String, String)> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining).ok()? {
            (Stream::Stdout, text) => stdout = Some(text),
            (Stream::Stderr, text) => stderr = Some(text),
        }
    }
    Some((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The child was spawned with pgid == pid.
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_reader<R>(stream: Stream, pipe: Option<R>, tx: mpsc::Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}
