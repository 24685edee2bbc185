//! Child-process supervision.
//!
//! The front end is the sole supervisor: probe, backend, and middleware
//! are spawned here, liveness-checked on a prompt cadence, and restarted
//! under a budget of K restarts per rolling window. A child that exhausts
//! its budget is marked degraded for the rest of the session and the
//! prompt glyph says so.
//!
//! Supervised children are placed in their own process group so a ^C at
//! the terminal never reaches them; they are told to exit with SIGTERM at
//! shutdown and killed only if they ignore it.

use std::collections::VecDeque;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// Restart budget: at most this many restarts per rolling window.
pub const MAX_RESTARTS: usize = 3;
/// The rolling window for the restart budget.
pub const RESTART_WINDOW: Duration = Duration::from_secs(60);

/// The supervised processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    Probe,
    Backend,
    Middleware,
}

impl ChildRole {
    pub fn name(&self) -> &'static str {
        match self {
            ChildRole::Probe => "probe",
            ChildRole::Backend => "backend",
            ChildRole::Middleware => "middleware",
        }
    }

    fn binary_name(&self) -> &'static str {
        match self {
            ChildRole::Probe => "hermsh-probe",
            ChildRole::Backend => "hermsh-backend",
            ChildRole::Middleware => "hermsh-middleware",
        }
    }
}

/// Health as rendered in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Running.
    Up,
    /// Not running yet (or between restarts).
    Starting,
    /// Restart budget exhausted; feature off for this session.
    Degraded,
}

/// Sliding-window restart budget.
#[derive(Debug)]
pub struct RestartBudget {
    events: VecDeque<Instant>,
    max: usize,
    window: Duration,
}

impl RestartBudget {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            max,
            window,
        }
    }

    /// Record a restart attempt at `now`; `false` means the budget is
    /// exhausted and the caller must degrade instead.
    pub fn allow(&mut self, now: Instant) -> bool {
        while let Some(front) = self.events.front() {
            if now.duration_since(*front) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
        if self.events.len() < self.max {
            self.events.push_back(now);
            true
        } else {
            false
        }
    }
}

/// How to start one child.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub role: ChildRole,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ChildSpec {
    /// Spec for a hermsh child binary: prefer a sibling of the current
    /// executable, fall back to `$PATH` lookup.
    pub fn for_role(role: ChildRole) -> Self {
        let program = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(role.binary_name())))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(role.binary_name()));
        Self {
            role,
            program,
            args: Vec::new(),
        }
    }
}

struct Supervised {
    spec: ChildSpec,
    child: Option<Child>,
    budget: RestartBudget,
    degraded: bool,
}

/// The supervisor proper.
pub struct Supervisor {
    children: Vec<Supervised>,
}

impl Supervisor {
    pub fn new(specs: Vec<ChildSpec>) -> Self {
        let children = specs
            .into_iter()
            .map(|spec| Supervised {
                spec,
                child: None,
                budget: RestartBudget::new(MAX_RESTARTS, RESTART_WINDOW),
                degraded: false,
            })
            .collect();
        Self { children }
    }

    /// Spec list for the standard hermsh topology.
    pub fn standard_specs() -> Vec<ChildSpec> {
        vec![
            ChildSpec::for_role(ChildRole::Probe),
            ChildSpec::for_role(ChildRole::Backend),
            ChildSpec::for_role(ChildRole::Middleware),
        ]
    }

    /// Spawn everything that is not yet running.
    pub fn start_all(&mut self) {
        for entry in &mut self.children {
            if entry.child.is_none() && !entry.degraded {
                match spawn_child(&entry.spec) {
                    Ok(child) => {
                        info!(role = entry.spec.role.name(), pid = child.id(), "child started");
                        entry.child = Some(child);
                    }
                    Err(e) => {
                        warn!(role = entry.spec.role.name(), error = %e, "failed to start child");
                    }
                }
            }
        }
    }

    /// Liveness pass: reap exited children, restart under budget, degrade
    /// past it. Called on a prompt cadence.
    pub fn tick(&mut self) {
        let now = Instant::now();
        for entry in &mut self.children {
            if entry.degraded {
                continue;
            }
            let exited = match entry.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(Some(status)) => {
                        warn!(
                            role = entry.spec.role.name(),
                            status = %status,
                            "child exited"
                        );
                        true
                    }
                    Ok(None) => false,
                    Err(e) => {
                        warn!(role = entry.spec.role.name(), error = %e, "liveness check failed");
                        true
                    }
                },
                None => true,
            };
            if !exited {
                continue;
            }
            entry.child = None;

            if !entry.budget.allow(now) {
                warn!(
                    role = entry.spec.role.name(),
                    "restart budget exhausted, degrading for this session"
                );
                entry.degraded = true;
                continue;
            }
            match spawn_child(&entry.spec) {
                Ok(child) => {
                    info!(role = entry.spec.role.name(), pid = child.id(), "child restarted");
                    entry.child = Some(child);
                }
                Err(e) => {
                    warn!(role = entry.spec.role.name(), error = %e, "restart failed");
                }
            }
        }
    }

    pub fn health(&self, role: ChildRole) -> Health {
        match self.entry(role) {
            Some(entry) if entry.degraded => Health::Degraded,
            Some(entry) if entry.child.is_some() => Health::Up,
            _ => Health::Starting,
        }
    }

    pub fn degraded(&self, role: ChildRole) -> bool {
        self.health(role) == Health::Degraded
    }

    pub fn pid(&self, role: ChildRole) -> Option<u32> {
        self.entry(role)
            .and_then(|entry| entry.child.as_ref())
            .map(|child| child.id())
    }

    /// Graceful shutdown: SIGTERM, bounded wait, then SIGKILL.
    pub fn shutdown(&mut self) {
        for entry in &mut self.children {
            let Some(mut child) = entry.child.take() else {
                continue;
            };
            let pid = Pid::from_raw(child.id() as i32);
            debug!(role = entry.spec.role.name(), %pid, "stopping child");
            let _ = kill(pid, Signal::SIGTERM);

            let deadline = Instant::now() + Duration::from_secs(2);
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    _ => {
                        warn!(
                            role = entry.spec.role.name(),
                            "child ignored SIGTERM, killing"
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }
        }
    }

    fn entry(&self, role: ChildRole) -> Option<&Supervised> {
        self.children.iter().find(|entry| entry.spec.role == role)
    }
}

/// Spawn one child in its own process group with a closed stdin. Stderr is
/// inherited so child diagnostics reach the terminal under high verbosity.
fn spawn_child(spec: &ChildSpec) -> io::Result<Child> {
    Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .process_group(0)
        .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper_spec(role: ChildRole) -> ChildSpec {
        ChildSpec {
            role,
            program: PathBuf::from("sleep"),
            args: vec!["30".to_string()],
        }
    }

    #[test]
    fn test_budget_allows_up_to_max() {
        let mut budget = RestartBudget::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(budget.allow(now));
        assert!(budget.allow(now));
        assert!(budget.allow(now));
        assert!(!budget.allow(now));
    }

    #[test]
    fn test_budget_window_slides() {
        let mut budget = RestartBudget::new(1, Duration::from_millis(10));
        let start = Instant::now();
        assert!(budget.allow(start));
        assert!(!budget.allow(start));
        // Past the window the slot frees up again.
        assert!(budget.allow(start + Duration::from_millis(20)));
    }

    #[test]
    fn test_supervisor_runs_and_stops_children() {
        let mut supervisor = Supervisor::new(vec![sleeper_spec(ChildRole::Probe)]);
        supervisor.start_all();
        assert_eq!(supervisor.health(ChildRole::Probe), Health::Up);
        assert!(supervisor.pid(ChildRole::Probe).is_some());

        supervisor.tick();
        assert_eq!(supervisor.health(ChildRole::Probe), Health::Up);

        supervisor.shutdown();
        assert_eq!(supervisor.health(ChildRole::Probe), Health::Starting);
    }

    #[test]
    fn test_crashing_child_degrades_after_budget() {
        // `true` exits immediately, so every tick consumes budget.
        let spec = ChildSpec {
            role: ChildRole::Backend,
            program: PathBuf::from("true"),
            args: Vec::new(),
        };
        let mut supervisor = Supervisor::new(vec![spec]);
        supervisor.start_all();

        for _ in 0..MAX_RESTARTS + 2 {
            std::thread::sleep(Duration::from_millis(100));
            supervisor.tick();
        }
        assert_eq!(supervisor.health(ChildRole::Backend), Health::Degraded);
        assert!(supervisor.degraded(ChildRole::Backend));
    }

    #[test]
    fn test_missing_binary_eventually_degrades() {
        let spec = ChildSpec {
            role: ChildRole::Middleware,
            program: PathBuf::from("/hermsh/no/such/binary"),
            args: Vec::new(),
        };
        let mut supervisor = Supervisor::new(vec![spec]);
        supervisor.start_all();
        for _ in 0..MAX_RESTARTS + 2 {
            supervisor.tick();
        }
        assert_eq!(supervisor.health(ChildRole::Middleware), Health::Degraded);
    }
}
