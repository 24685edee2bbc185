//! The interactive loop and the per-line state machine.
//!
//! For every non-empty line: control and builtin commands stay in-process;
//! structurally interactive programs get the terminal immediately; every
//! other line goes to the probe, and its verdict decides between printing
//! captured output, handing over the terminal, degrading to direct
//! execution, or forwarding the failure as an AI query through the
//! middleware. AI command suggestions re-enter the same dispatcher with a
//! bounded depth.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, trace, warn};

use hermsh_config::Config;
use hermsh_core::paths::{history_file, Rendezvous};
use hermsh_core::protocol::{Reply, Request};
use hermsh_core::Verdict;

use crate::backend_client::{BackendClient, BackendError};
use crate::builtins::{self, BuiltinOutcome};
use crate::classify::{classify, word_count, LineClass, MIN_QUERY_WORDS};
use crate::control::{self, ControlCmd, HELP_TEXT};
use crate::exec;
use crate::probe_client::ProbeClient;
use crate::prompt::{
    abbreviate_home, backend_glyph, middleware_glyph, probe_glyph, AiState, ContextCache,
    PromptInput,
};
use crate::supervisor::{ChildRole, Supervisor};

/// Liveness pass cadence, in prompts.
const HEALTH_CHECK_EVERY: u64 = 10;
/// AI suggestions may recurse through the dispatcher this many times.
const MAX_AI_DEPTH: u8 = 1;
/// Prompt context TTL.
const CONTEXT_TTL: Duration = Duration::from_secs(5);

pub struct Repl {
    config: Config,
    config_path: PathBuf,
    rendezvous: Rendezvous,
    supervisor: Supervisor,
    probe: ProbeClient,
    backend: BackendClient,
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
    cache: ContextCache,
    /// Last working directory the backend acknowledged.
    acked_cwd: Option<PathBuf>,
    ai_state: AiState,
    prompt_count: u64,
    exit_requested: bool,
}

impl Repl {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        rendezvous: Rendezvous,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self> {
        let supervisor = Supervisor::new(Supervisor::standard_specs());
        let probe = ProbeClient::new(rendezvous.probe_sock());
        let backend = BackendClient::new(rendezvous.middleware_sock(), interrupt);
        let editor = DefaultEditor::new()?;

        Ok(Self {
            config,
            config_path,
            rendezvous,
            supervisor,
            probe,
            backend,
            editor,
            history_path: history_file(),
            cache: ContextCache::new(CONTEXT_TTL),
            acked_cwd: None,
            ai_state: AiState::Unknown,
            prompt_count: 0,
            exit_requested: false,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.supervisor.start_all();
        if let Some(path) = self.history_path.clone() {
            let _ = self.editor.load_history(&path);
        }

        while !self.exit_requested {
            self.prompt_count += 1;
            if self.prompt_count % HEALTH_CHECK_EVERY == 0 {
                self.supervisor.tick();
            }
            if self.supervisor.health(ChildRole::Backend) != crate::supervisor::Health::Up {
                // A dead or restarting backend invalidates whatever the AI
                // last reported.
                self.ai_state = AiState::Unknown;
            }
            self.poll_ai_status();

            let prompt = self.render_prompt();
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(&line);
                    self.dispatch(&line, 0);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("hermsh: terminal error: {e}");
                    break;
                }
            }
        }

        if let Some(path) = self.history_path.clone() {
            let _ = self.editor.save_history(&path);
        }
        self.supervisor.shutdown();
        println!("goodbye");
        Ok(())
    }

    /// The per-line state machine. `depth` bounds AI suggestion recursion.
    fn dispatch(&mut self, line: &str, depth: u8) {
        match classify(line) {
            LineClass::Empty => {}
            LineClass::Control => self.handle_control(line),
            LineClass::Builtin => self.handle_builtin(line),
            LineClass::StructuralTty => self.run_with_terminal(line),
            LineClass::Other => self.run_pipeline(line, depth),
        }
    }

    fn handle_builtin(&mut self, line: &str) {
        match builtins::handle(line) {
            BuiltinOutcome::Exit => self.exit_requested = true,
            BuiltinOutcome::ChangedDir(cwd) => {
                // Mirror into the probe shell so future probes run from the
                // right place. The backend learns on the next query.
                let mirror = format!("cd {}", shell_quote(&cwd));
                match self.probe.probe(&mirror) {
                    Verdict::Ok { exit_code: 0, .. } => trace!(cwd = %cwd.display(), "probe cwd mirrored"),
                    other => debug!(?other, "probe cwd mirror failed"),
                }
            }
            BuiltinOutcome::Continue => {}
        }
    }

    fn run_with_terminal(&mut self, line: &str) {
        match exec::run_tty(line) {
            Ok(code) => {
                if code != 0 && self.config.verbose >= 1 {
                    eprintln!("hermsh: exited with code {code}");
                }
            }
            Err(e) => eprintln!("hermsh: failed to run {line:?}: {e}"),
        }
    }

    fn run_pipeline(&mut self, line: &str, depth: u8) {
        let started = std::time::Instant::now();
        let verdict = self.probe.probe(line);
        trace!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            verdict = ?verdict_name(&verdict),
            "probe answered"
        );
        match verdict {
            Verdict::Ok {
                exit_code,
                stdout,
                stderr,
            } => {
                if exit_code == 0 && stderr.trim().is_empty() {
                    print!("{stdout}");
                } else {
                    // A clean exit with stderr noise still printed its
                    // stdout; then both streams travel as failure context.
                    if exit_code == 0 {
                        print!("{stdout}");
                    }
                    self.failure_path(line, exit_code, &stdout, &stderr, depth);
                }
            }
            Verdict::Interactive => self.run_with_terminal(line),
            Verdict::Timeout | Verdict::Unavailable => {
                if self.config.verbose >= 1 {
                    eprintln!("hermsh: probe degraded, executing directly");
                }
                if let Err(e) = exec::run_direct(line) {
                    eprintln!("hermsh: failed to run {line:?}: {e}");
                }
            }
        }
    }

    /// Failure path: report short lines verbatim, otherwise forward the
    /// failure as context for an AI query and act on the reply.
    fn failure_path(&mut self, line: &str, exit_code: i32, stdout: &str, stderr: &str, depth: u8) {
        if word_count(line) < MIN_QUERY_WORDS {
            report_failure(exit_code, stdout, stderr);
            return;
        }
        if depth >= MAX_AI_DEPTH {
            report_failure(exit_code, stdout, stderr);
            return;
        }
        if self.supervisor.degraded(ChildRole::Middleware)
            || self.supervisor.degraded(ChildRole::Backend)
        {
            report_failure(exit_code, stdout, stderr);
            return;
        }

        let capture = match exec::write_capture(stdout, stderr) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "could not write capture file");
                report_failure(exit_code, stdout, stderr);
                return;
            }
        };
        if !self.sync_cwd() {
            if self.config.verbose >= 1 {
                eprintln!("hermsh: AI offline");
            }
            report_failure(exit_code, stdout, stderr);
            return;
        }

        let request = Request::BashFailed {
            exit_code,
            line: line.to_string(),
            output_path: capture.path().display().to_string(),
        };
        match self.backend.request(&request) {
            Ok(Reply::Cmd(suggestion)) => {
                if self.config.verbose >= 1 {
                    println!("hermsh: suggested command: {suggestion}");
                }
                // The suggestion goes through the same classifier as a
                // user-typed line, one level deep.
                self.dispatch(&suggestion, depth + 1);
            }
            Ok(Reply::Edit(text)) => println!("{text}"),
            Ok(Reply::Blocked(reason)) => println!("hermsh: command blocked: {reason}"),
            Ok(other) => {
                debug!(?other, "unexpected reply to failure query");
                report_failure(exit_code, stdout, stderr);
            }
            Err(BackendError::Interrupted) => println!("^C"),
            Err(e) => {
                if self.config.verbose >= 1 {
                    eprintln!("hermsh: {e}");
                }
                report_failure(exit_code, stdout, stderr);
            }
        }
        // `capture` dropped here — the file outlived the backend's read.
    }

    /// Guarantee the backend's view of the working directory before any
    /// dependent query. Repeated syncs of an unchanged directory are
    /// no-ops.
    fn sync_cwd(&mut self) -> bool {
        let Ok(cwd) = std::env::current_dir() else {
            return false;
        };
        if self.acked_cwd.as_deref() == Some(cwd.as_path()) {
            return true;
        }
        match self
            .backend
            .request(&Request::Cwd(cwd.display().to_string()))
        {
            Ok(Reply::Ok) => {
                self.acked_cwd = Some(cwd);
                true
            }
            Ok(reply) => {
                debug!(?reply, "cwd sync rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "cwd sync failed");
                false
            }
        }
    }

    /// Cheap status poll while the AI is not known to be ready.
    fn poll_ai_status(&mut self) {
        if self.ai_state == AiState::Ready {
            return;
        }
        if self.supervisor.health(ChildRole::Middleware) != crate::supervisor::Health::Up {
            return;
        }
        match self.backend.request(&Request::Status) {
            Ok(Reply::AiReady) => self.ai_state = AiState::Ready,
            Ok(Reply::AiLoading) => self.ai_state = AiState::Loading,
            Ok(Reply::AiFailed) => self.ai_state = AiState::Failed,
            Ok(_) | Err(_) => {}
        }
    }

    fn handle_control(&mut self, line: &str) {
        let cmd = match control::parse(line) {
            Ok(cmd) => cmd,
            Err(usage) => {
                println!("{usage}");
                return;
            }
        };
        match cmd {
            ControlCmd::Help => println!("{HELP_TEXT}"),
            ControlCmd::Status => self.print_status(),
            ControlCmd::VerboseGet => {
                println!("verbosity: {} (0 silent, 1 info, 2 debug)", self.config.verbose)
            }
            ControlCmd::VerboseSet(level) => {
                self.config.verbose = level;
                if let Err(e) =
                    Config::set_in_file(&self.config_path, "VERBOSE", &level.to_string())
                {
                    eprintln!("hermsh: could not persist VERBOSE: {e}");
                }
                let _ = self.backend.request(&Request::Verbose(level));
                println!("verbosity set to {level}");
            }
            ControlCmd::ProviderGet => {
                println!(
                    "AI provider: {} (model: {})",
                    self.config.provider,
                    self.config.model.as_deref().unwrap_or("provider default")
                );
            }
            ControlCmd::ProviderSet(provider) => {
                self.config.provider = provider;
                if let Err(e) =
                    Config::set_in_file(&self.config_path, "AI_PROVIDER", provider.as_str())
                {
                    eprintln!("hermsh: could not persist AI_PROVIDER: {e}");
                }
                let _ = self
                    .backend
                    .request(&Request::AiProvider(provider.as_str().to_string()));
                println!("AI provider set to {provider} (takes effect next session)");
            }
        }
    }

    fn print_status(&mut self) {
        self.poll_ai_status();
        println!("hermsh {}", hermsh_core::build_info::version_string());
        println!(
            "  AI:         {}",
            match self.ai_state {
                AiState::Unknown => "unknown",
                AiState::Loading => "loading",
                AiState::Ready => "ready",
                AiState::Failed => "failed",
            }
        );
        println!("  Provider:   {}", self.config.provider);
        println!(
            "  Model:      {}",
            self.config.model.as_deref().unwrap_or("provider default")
        );
        println!("  Verbosity:  {}", self.config.verbose);
        for role in [ChildRole::Probe, ChildRole::Backend, ChildRole::Middleware] {
            let health = match self.supervisor.health(role) {
                crate::supervisor::Health::Up => "up",
                crate::supervisor::Health::Starting => "starting",
                crate::supervisor::Health::Degraded => "degraded",
            };
            match self.supervisor.pid(role) {
                Some(pid) => println!("  {:<11} {health} (pid {pid})", format!("{}:", role.name())),
                None => println!("  {:<11} {health}", format!("{}:", role.name())),
            }
        }
        println!("  Runtime:    {}", self.rendezvous.base().display());
    }

    fn render_prompt(&mut self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("?"));
        let kubeconfig = kubeconfig_path();
        self.cache
            .refresh_if_stale(&cwd, &self.rendezvous.sec_status(), kubeconfig.as_deref());

        let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let home = std::env::var("HOME").ok().map(PathBuf::from);
        let cwd_display = abbreviate_home(&cwd, home.as_deref());

        prompt_string(self, &user, &host, &cwd_display)
    }
}

fn prompt_string(repl: &Repl, user: &str, host: &str, cwd: &str) -> String {
    crate::prompt::render(&PromptInput {
        backend: backend_glyph(repl.supervisor.health(ChildRole::Backend), repl.ai_state),
        middleware: middleware_glyph(repl.supervisor.health(ChildRole::Middleware)),
        probe: probe_glyph(repl.supervisor.health(ChildRole::Probe)),
        user,
        host,
        cwd,
        cache: &repl.cache,
    })
}

/// Print a failure the AI is not going to see (or failed to improve on).
fn report_failure(exit_code: i32, stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        print!("{stdout}");
    }
    if !stderr.is_empty() {
        eprint!("{stderr}");
    }
    if stdout.is_empty() && stderr.is_empty() && exit_code != 0 {
        eprintln!("hermsh: command exited with code {exit_code}");
    }
}

fn verdict_name(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Ok { .. } => "ok",
        Verdict::Interactive => "interactive",
        Verdict::Timeout => "timeout",
        Verdict::Unavailable => "unavailable",
    }
}

/// Quote a path for the probe's `cd` mirror line.
fn shell_quote(path: &Path) -> String {
    let raw = path.display().to_string();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// `$KUBECONFIG` override or `~/.kube/config`.
fn kubeconfig_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain_and_quoted() {
        assert_eq!(shell_quote(Path::new("/tmp/a b")), "'/tmp/a b'");
        assert_eq!(shell_quote(Path::new("/tmp/it's")), r"'/tmp/it'\''s'");
    }

    #[test]
    fn test_kubeconfig_env_override() {
        std::env::set_var("KUBECONFIG", "/tmp/kc");
        assert_eq!(kubeconfig_path(), Some(PathBuf::from("/tmp/kc")));
        std::env::remove_var("KUBECONFIG");
    }
}
