//! Request/reply wire grammar.
//!
//! All hermsh sockets speak a textual, line-oriented protocol (framing in
//! [`crate::ipc::framing`]). This module defines the typed message set and
//! its encoding:
//!
//! - front end → middleware → backend: [`Request`]
//! - backend → middleware → front end: [`Reply`]
//! - probe → front end: [`encode_verdict`] / [`parse_verdict`]
//!
//! `Request` parsing is strict — a malformed request is an error the server
//! answers with a diagnostic. `Reply` parsing is total: anything that does
//! not match the grammar is treated as informational text, so an upgraded
//! backend can never render the front end mute.

use crate::probe::Verdict;

/// Errors from parsing wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown request {0:?}")]
    UnknownRequest(String),

    #[error("malformed {kind} request: {detail}")]
    Malformed { kind: &'static str, detail: String },

    #[error("malformed probe verdict: {0}")]
    MalformedVerdict(String),
}

/// A request from the front end to (what it believes is) the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `STATUS` — cheap AI-status poll.
    Status,
    /// `CWD:<absolute-path>` — working-directory update.
    Cwd(String),
    /// `QUERY:<raw-line>` — natural-language query.
    Query(String),
    /// `BASH_FAILED:<exit>:<raw-line>:<output-path>` — failure-context query.
    BashFailed {
        exit_code: i32,
        line: String,
        output_path: String,
    },
    /// `VERBOSE:<0|1|2>` — diagnostic verbosity change.
    Verbose(u8),
    /// `AI_PROVIDER:<identifier>` — provider change, effective next session.
    AiProvider(String),
}

impl Request {
    /// Encode to the wire form (single line, no trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Request::Status => "STATUS".to_string(),
            Request::Cwd(path) => format!("CWD:{path}"),
            Request::Query(line) => format!("QUERY:{line}"),
            Request::BashFailed {
                exit_code,
                line,
                output_path,
            } => format!("BASH_FAILED:{exit_code}:{line}:{output_path}"),
            Request::Verbose(level) => format!("VERBOSE:{level}"),
            Request::AiProvider(id) => format!("AI_PROVIDER:{id}"),
        }
    }

    /// Parse a wire message into a request.
    pub fn parse(msg: &str) -> Result<Self, ProtocolError> {
        if msg.is_empty() {
            return Err(ProtocolError::Empty);
        }
        if msg == "STATUS" {
            return Ok(Request::Status);
        }
        if let Some(path) = msg.strip_prefix("CWD:") {
            if !path.starts_with('/') {
                return Err(ProtocolError::Malformed {
                    kind: "CWD",
                    detail: format!("path must be absolute, got {path:?}"),
                });
            }
            return Ok(Request::Cwd(path.to_string()));
        }
        if let Some(line) = msg.strip_prefix("QUERY:") {
            if line.is_empty() {
                return Err(ProtocolError::Malformed {
                    kind: "QUERY",
                    detail: "empty query line".to_string(),
                });
            }
            return Ok(Request::Query(line.to_string()));
        }
        if let Some(rest) = msg.strip_prefix("BASH_FAILED:") {
            let (code_str, rest) = rest.split_once(':').ok_or(ProtocolError::Malformed {
                kind: "BASH_FAILED",
                detail: "missing exit code separator".to_string(),
            })?;
            let exit_code = code_str.parse::<i32>().map_err(|_| ProtocolError::Malformed {
                kind: "BASH_FAILED",
                detail: format!("bad exit code {code_str:?}"),
            })?;
            // The command line may itself contain colons; the capture path
            // never does (it is a generated temp path), so split at the last.
            let (line, output_path) = rest.rsplit_once(':').ok_or(ProtocolError::Malformed {
                kind: "BASH_FAILED",
                detail: "missing output path separator".to_string(),
            })?;
            if line.is_empty() {
                return Err(ProtocolError::Malformed {
                    kind: "BASH_FAILED",
                    detail: "empty command line".to_string(),
                });
            }
            return Ok(Request::BashFailed {
                exit_code,
                line: line.to_string(),
                output_path: output_path.to_string(),
            });
        }
        if let Some(level) = msg.strip_prefix("VERBOSE:") {
            let level = level.parse::<u8>().ok().filter(|l| *l <= 2).ok_or(
                ProtocolError::Malformed {
                    kind: "VERBOSE",
                    detail: format!("level must be 0, 1, or 2, got {level:?}"),
                },
            )?;
            return Ok(Request::Verbose(level));
        }
        if let Some(id) = msg.strip_prefix("AI_PROVIDER:") {
            if id.is_empty() {
                return Err(ProtocolError::Malformed {
                    kind: "AI_PROVIDER",
                    detail: "empty provider identifier".to_string(),
                });
            }
            return Ok(Request::AiProvider(id.to_string()));
        }
        Err(ProtocolError::UnknownRequest(truncate(msg, 64)))
    }

    /// Whether this is a coordination message the middleware always passes
    /// through without policy evaluation.
    pub fn is_coordination(&self) -> bool {
        matches!(
            self,
            Request::Status | Request::Cwd(_) | Request::Verbose(_) | Request::AiProvider(_)
        )
    }

    /// The shell command line carried by this request, if any. This is what
    /// the middleware's command policy evaluates.
    pub fn command_line(&self) -> Option<&str> {
        match self {
            Request::Query(line) => Some(line),
            Request::BashFailed { line, .. } => Some(line),
            _ => None,
        }
    }
}

/// A reply flowing from the backend to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `AI_READY` — status token.
    AiReady,
    /// `AI_LOADING` — status token.
    AiLoading,
    /// `AI_FAILED` — status token.
    AiFailed,
    /// `OK` — acknowledgment.
    Ok,
    /// `cmd:<command>` — a single-line command suggestion.
    Cmd(String),
    /// `edit:<text>` — informational text, possibly multiline.
    Edit(String),
    /// `blocked:<reason>` — rejected by policy or synthesized on failure.
    Blocked(String),
}

impl Reply {
    /// Encode to the wire form. `Cmd` payloads are flattened to their first
    /// line — the grammar requires a single-line command.
    pub fn encode(&self) -> String {
        match self {
            Reply::AiReady => "AI_READY".to_string(),
            Reply::AiLoading => "AI_LOADING".to_string(),
            Reply::AiFailed => "AI_FAILED".to_string(),
            Reply::Ok => "OK".to_string(),
            Reply::Cmd(cmd) => {
                let first_line = cmd.lines().next().unwrap_or_default();
                format!("cmd:{first_line}")
            }
            Reply::Edit(text) => format!("edit:{text}"),
            Reply::Blocked(reason) => {
                let first_line = reason.lines().next().unwrap_or_default();
                format!("blocked:{first_line}")
            }
        }
    }

    /// Parse a wire message into a reply.
    ///
    /// Total: an unrecognized payload degrades to informational text.
    pub fn parse(msg: &str) -> Self {
        match msg {
            "AI_READY" => return Reply::AiReady,
            "AI_LOADING" => return Reply::AiLoading,
            "AI_FAILED" => return Reply::AiFailed,
            "OK" => return Reply::Ok,
            _ => {}
        }
        if let Some(cmd) = msg.strip_prefix("cmd:") {
            return Reply::Cmd(cmd.trim_start().to_string());
        }
        if let Some(text) = msg.strip_prefix("edit:") {
            return Reply::Edit(text.to_string());
        }
        if let Some(reason) = msg.strip_prefix("blocked:") {
            return Reply::Blocked(reason.to_string());
        }
        Reply::Edit(msg.to_string())
    }
}

// ── Probe verdict wire form ─────────────────────────────────────────────

/// Encode a probe verdict for the probe socket.
///
/// Layout: an `EXIT_CODE:` line, then length-prefixed `STDOUT:` and
/// `STDERR:` sections so captured output may contain anything at all.
pub fn encode_verdict(verdict: &Verdict) -> String {
    let (code, stdout, stderr) = match verdict {
        Verdict::Ok {
            exit_code,
            stdout,
            stderr,
        } => (exit_code.to_string(), stdout.as_str(), stderr.as_str()),
        Verdict::Interactive => ("INTERACTIVE".to_string(), "", ""),
        Verdict::Timeout => ("TIMEOUT".to_string(), "", ""),
        Verdict::Unavailable => ("UNAVAILABLE".to_string(), "", ""),
    };
    format!(
        "EXIT_CODE:{code}\nSTDOUT:{}\n{stdout}\nSTDERR:{}\n{stderr}\n",
        stdout.len(),
        stderr.len(),
    )
}

/// Parse a probe verdict from its wire form.
pub fn parse_verdict(msg: &str) -> Result<Verdict, ProtocolError> {
    let rest = msg
        .strip_prefix("EXIT_CODE:")
        .ok_or_else(|| ProtocolError::MalformedVerdict("missing EXIT_CODE".to_string()))?;
    let (code, rest) = rest
        .split_once('\n')
        .ok_or_else(|| ProtocolError::MalformedVerdict("truncated after EXIT_CODE".to_string()))?;

    match code {
        "INTERACTIVE" => return Ok(Verdict::Interactive),
        "TIMEOUT" => return Ok(Verdict::Timeout),
        "UNAVAILABLE" => return Ok(Verdict::Unavailable),
        _ => {}
    }
    let exit_code = code
        .parse::<i32>()
        .map_err(|_| ProtocolError::MalformedVerdict(format!("bad exit code {code:?}")))?;

    let (stdout, rest) = take_section(rest, "STDOUT:")?;
    let (stderr, _) = take_section(rest, "STDERR:")?;

    Ok(Verdict::Ok {
        exit_code,
        stdout,
        stderr,
    })
}

/// Parse one `NAME:<len>\n<len bytes>\n` section, returning the payload and
/// the remainder.
fn take_section<'a>(input: &'a str, name: &str) -> Result<(String, &'a str), ProtocolError> {
    let rest = input
        .strip_prefix(name)
        .ok_or_else(|| ProtocolError::MalformedVerdict(format!("missing {name} section")))?;
    let (len, rest) = rest
        .split_once('\n')
        .ok_or_else(|| ProtocolError::MalformedVerdict(format!("truncated {name} length")))?;
    let len = len
        .parse::<usize>()
        .map_err(|_| ProtocolError::MalformedVerdict(format!("bad {name} length {len:?}")))?;
    if rest.len() < len + 1 || !rest.is_char_boundary(len) {
        return Err(ProtocolError::MalformedVerdict(format!(
            "{name} payload shorter than declared length {len}"
        )));
    }
    let payload = rest[..len].to_string();
    // skip payload and its trailing newline
    Ok((payload, &rest[len + 1..]))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
