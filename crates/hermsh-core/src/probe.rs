//! Command pre-execution engine.
//!
//! [`ShellProbe`] owns a long-lived interactive `bash` with piped stdio and
//! uses it to judge candidate command lines before the front end commits to
//! them. For each probed line the shell is asked to run the line and then
//! echo a unique sentinel with the exit status. What comes back decides the
//! [`Verdict`]:
//!
//! - sentinel seen → the line ran to completion; exit code and captured
//!   streams are reported;
//! - no sentinel, but the shell's primary prompt reappears → the probed
//!   program swallowed the sentinel line from stdin and handed control back
//!   to the shell, which is the signature of a program that wants a real
//!   terminal;
//! - neither within the deadline → timeout; the inner shell is killed and
//!   respawned.
//!
//! The probe is an efficiency and classification device, not a security
//! boundary: probed lines run with the caller's privileges.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Prompt handed to the inner shell. The engine still learns the prompt it
/// actually observes at startup, in case the shell overrides it.
const DEFAULT_PROMPT: &str = "hermsh-probe$ ";

/// The probe's judgement of a single command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The line ran to completion.
    Ok {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The line launched a program that needs a controlling terminal.
    Interactive,
    /// No result within the deadline; the inner shell was recycled.
    Timeout,
    /// The probe's shell is dead and could not be used.
    Unavailable,
}

/// Tunables for the probe engine.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Shell executable.
    pub shell: String,
    /// Wall-clock budget per probed line.
    pub timeout: Duration,
    /// How long a bare trailing prompt must persist before the verdict is
    /// `Interactive`. Covers the instant between the prompt reappearing and
    /// the sentinel echo executing on the happy path.
    pub prompt_grace: Duration,
    /// How long to wait for the shell's startup prompt.
    pub startup_window: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            timeout: Duration::from_secs(5),
            prompt_grace: Duration::from_millis(200),
            startup_window: Duration::from_millis(750),
        }
    }
}

struct ShellChild {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    /// The primary prompt string observed at startup.
    prompt: String,
}

/// A long-lived shell host for probing command lines.
///
/// One request in flight at a time; the front end's classification pipeline
/// is strictly sequential.
pub struct ShellProbe {
    config: ProbeConfig,
    inner: Option<ShellChild>,
    seq: u64,
}

impl ShellProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            inner: None,
            seq: 0,
        }
    }

    /// Spawn the inner shell if it is not running. Returns `false` when the
    /// shell cannot be started.
    pub async fn ensure_started(&mut self) -> bool {
        if self.inner.is_some() {
            return true;
        }
        match self.spawn_shell().await {
            Ok(child) => {
                debug!(prompt = %child.prompt, "probe shell started");
                self.inner = Some(child);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to start probe shell");
                false
            }
        }
    }

    /// Probe one command line.
    ///
    /// The line must not contain newlines (embedded newlines are replaced by
    /// spaces). Never panics and never blocks past the configured deadline.
    pub async fn probe(&mut self, line: &str) -> Verdict {
        if !self.ensure_started().await {
            return Verdict::Unavailable;
        }
        let line = line.replace('\n', " ");
        self.seq += 1;
        let sentinel = format!("__HERMSH_{}__", self.seq);

        self.drain_pending().await;

        // The sentinel echo is the *next* input line: a well-behaved command
        // leaves it for the shell, a terminal-hungry program eats it.
        let payload = format!("{line}\necho {sentinel} $?\n");
        let write_ok = {
            let Some(inner) = self.inner.as_mut() else {
                return Verdict::Unavailable;
            };
            match inner.stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {
                    let _ = inner.stdin.flush().await;
                    true
                }
                Err(_) => false,
            }
        };
        if !write_ok {
            self.recycle().await;
            return Verdict::Unavailable;
        }

        match self.read_verdict(&sentinel).await {
            ReadOutcome::Done(verdict) => verdict,
            ReadOutcome::TimedOut => {
                debug!(line = %line, "probe timeout, recycling shell");
                self.recycle().await;
                Verdict::Timeout
            }
            ReadOutcome::ShellDied => {
                self.recycle().await;
                Verdict::Unavailable
            }
        }
    }

    /// Tear down the inner shell; the next probe respawns it.
    pub async fn recycle(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            let _ = inner.child.kill().await;
        }
    }

    async fn spawn_shell(&self) -> std::io::Result<ShellChild> {
        let mut child = Command::new(&self.config.shell)
            .args(["--norc", "--noprofile", "-i"])
            .env("PS1", DEFAULT_PROMPT)
            .env("TERM", "dumb")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let missing_pipe =
            || std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child pipe missing");
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let mut stderr = child.stderr.take().ok_or_else(missing_pipe)?;

        // Learn the primary prompt: interactive shells announce themselves on
        // stderr; the prompt is whatever trails the last newline.
        let mut startup = Vec::new();
        let deadline = Instant::now() + self.config.startup_window;
        let mut buf = [0u8; 1024];
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match tokio::time::timeout(left.min(Duration::from_millis(50)), stderr.read(&mut buf))
                .await
            {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    startup.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&startup);
                    // A trailing prompt means the shell is ready.
                    if text.ends_with(DEFAULT_PROMPT) {
                        break;
                    }
                }
                Ok(Err(_)) => break,
                Err(_) if !startup.is_empty() => break,
                Err(_) => {}
            }
        }
        let text = String::from_utf8_lossy(&startup);
        let prompt = text
            .rsplit('\n')
            .next()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROMPT)
            .trim_end_matches('\r')
            .to_string();

        Ok(ShellChild {
            child,
            stdin,
            stdout,
            stderr,
            prompt,
        })
    }

    /// Discard output left over from a previous probe (late prompts, stray
    /// bytes from a recycled command).
    async fn drain_pending(&mut self) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        let mut buf = [0u8; 1024];
        loop {
            match tokio::time::timeout(Duration::from_millis(1), inner.stdout.read(&mut buf)).await
            {
                Ok(Ok(n)) if n > 0 => continue,
                _ => break,
            }
        }
        loop {
            match tokio::time::timeout(Duration::from_millis(1), inner.stderr.read(&mut buf)).await
            {
                Ok(Ok(n)) if n > 0 => continue,
                _ => break,
            }
        }
    }

    async fn read_verdict(&mut self, sentinel: &str) -> ReadOutcome {
        let inner = match self.inner.as_mut() {
            Some(inner) => inner,
            None => return ReadOutcome::ShellDied,
        };
        let deadline = Instant::now() + self.config.timeout;
        let grace = self.config.prompt_grace;
        let prompt = inner.prompt.clone();

        let mut out_buf: Vec<u8> = Vec::new();
        let mut err_buf: Vec<u8> = Vec::new();
        let mut tmp_out = [0u8; 4096];
        let mut tmp_err = [0u8; 4096];
        let mut prompt_seen_at: Option<Instant> = None;

        loop {
            // Sentinel beats everything: the line completed.
            let out_text = String::from_utf8_lossy(&out_buf).into_owned();
            if let Some(pos) = out_text.find(sentinel) {
                let after = &out_text[pos + sentinel.len()..];
                if let Some(nl) = after.find('\n') {
                    let exit_code = after[..nl].trim().parse::<i32>().unwrap_or(-1);
                    let stdout = out_text[..pos].to_string();
                    let stderr = strip_prompts(&String::from_utf8_lossy(&err_buf), &prompt);
                    trace!(exit_code, "probe sentinel observed");
                    return ReadOutcome::Done(Verdict::Ok {
                        exit_code,
                        stdout,
                        stderr,
                    });
                }
            } else if let Some(seen) = prompt_seen_at {
                // Prompt came back without a sentinel: the probed program
                // consumed the sentinel line. Give the happy path a grace
                // window, then call it interactive.
                if seen.elapsed() >= grace {
                    trace!("probe prompt reappeared without sentinel");
                    return ReadOutcome::Done(Verdict::Interactive);
                }
            }

            if String::from_utf8_lossy(&err_buf).ends_with(&prompt) {
                prompt_seen_at.get_or_insert_with(Instant::now);
            } else {
                prompt_seen_at = None;
            }

            let now = Instant::now();
            if now >= deadline {
                return ReadOutcome::TimedOut;
            }
            let mut wake = deadline;
            if let Some(seen) = prompt_seen_at {
                wake = wake.min(seen + grace);
            }

            tokio::select! {
                r = inner.stdout.read(&mut tmp_out) => match r {
                    Ok(0) | Err(_) => return ReadOutcome::ShellDied,
                    Ok(n) => out_buf.extend_from_slice(&tmp_out[..n]),
                },
                r = inner.stderr.read(&mut tmp_err) => match r {
                    Ok(0) | Err(_) => return ReadOutcome::ShellDied,
                    Ok(n) => err_buf.extend_from_slice(&tmp_err[..n]),
                },
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

enum ReadOutcome {
    Done(Verdict),
    TimedOut,
    ShellDied,
}

/// Remove prompt echoes from captured stderr.
fn strip_prompts(text: &str, prompt: &str) -> String {
    if prompt.is_empty() {
        return text.to_string();
    }
    text.replace(prompt, "")
}
