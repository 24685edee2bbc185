//! Status prompt rendering.
//!
//! The prompt leads with one health glyph per supervised process, then
//! `user@host:cwd` and optional context segments (git branch, kube
//! context, security counter). Context fields are cached with a short TTL
//! so prompt latency stays imperceptible; everything here is display only.
//!
//! Glyph vocabulary (fixed): `@` backend ready, `#` middleware up,
//! `%` probe up, `~` starting, `!` degraded or failed.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::supervisor::Health;

/// AI status as last reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Unknown,
    Loading,
    Ready,
    Failed,
}

/// Backend glyph: process health gated by the AI session state.
pub fn backend_glyph(health: Health, ai: AiState) -> char {
    match health {
        Health::Degraded => '!',
        Health::Starting => '~',
        Health::Up => match ai {
            AiState::Ready => '@',
            AiState::Loading | AiState::Unknown => '~',
            AiState::Failed => '!',
        },
    }
}

pub fn middleware_glyph(health: Health) -> char {
    match health {
        Health::Up => '#',
        Health::Starting => '~',
        Health::Degraded => '!',
    }
}

pub fn probe_glyph(health: Health) -> char {
    match health {
        Health::Up => '%',
        Health::Starting => '~',
        Health::Degraded => '!',
    }
}

/// Cached context fields with a TTL.
pub struct ContextCache {
    ttl: Duration,
    fetched_at: Option<Instant>,
    pub branch: Option<String>,
    pub kube_context: Option<String>,
    pub kube_namespace: Option<String>,
    pub blocked_count: Option<u64>,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            fetched_at: None,
            branch: None,
            kube_context: None,
            kube_namespace: None,
            blocked_count: None,
        }
    }

    /// Refresh the cached fields if the TTL has lapsed.
    pub fn refresh_if_stale(&mut self, cwd: &Path, sec_status: &Path, kubeconfig: Option<&Path>) {
        if let Some(at) = self.fetched_at {
            if at.elapsed() < self.ttl {
                return;
            }
        }
        self.branch = read_git_branch(cwd);
        let (context, namespace) = kubeconfig
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|content| parse_kube_config(&content))
            .unwrap_or((None, None));
        self.kube_context = context;
        self.kube_namespace = namespace;
        self.blocked_count = std::fs::read_to_string(sec_status)
            .ok()
            .and_then(|content| parse_sec_status(&content));
        self.fetched_at = Some(Instant::now());
    }
}

/// Walk up from `cwd` looking for `.git/HEAD` and parse the branch.
fn read_git_branch(cwd: &Path) -> Option<String> {
    let mut dir = Some(cwd);
    while let Some(current) = dir {
        let head = current.join(".git").join("HEAD");
        if head.is_file() {
            let content = std::fs::read_to_string(head).ok()?;
            return parse_git_head(&content);
        }
        dir = current.parent();
    }
    None
}

/// Parse `.git/HEAD`: a symbolic ref yields the branch name, a detached
/// head yields a short hash.
pub fn parse_git_head(content: &str) -> Option<String> {
    let line = content.lines().next()?.trim();
    if let Some(reference) = line.strip_prefix("ref: ") {
        return reference.rsplit('/').next().map(str::to_string);
    }
    if line.len() >= 8 {
        return Some(line[..8].to_string());
    }
    None
}

/// Minimal kubeconfig scan: the current context name and, where the file
/// layout allows, that context's namespace. Good enough for a prompt.
pub fn parse_kube_config(content: &str) -> (Option<String>, Option<String>) {
    let mut current: Option<String> = None;
    for line in content.lines() {
        if let Some(value) = line.trim().strip_prefix("current-context:") {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() {
                current = Some(value.to_string());
            }
            break;
        }
    }
    let Some(ref context_name) = current else {
        return (None, None);
    };

    let mut item_namespace: Option<String> = None;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("- ") {
            item_namespace = None;
        }
        let inner = trimmed.trim_start_matches("- ");
        if let Some(value) = inner.trim().strip_prefix("namespace:") {
            item_namespace = Some(value.trim().trim_matches('"').to_string());
        }
        if let Some(value) = inner.trim().strip_prefix("name:") {
            if value.trim().trim_matches('"') == context_name {
                return (current, item_namespace);
            }
        }
    }
    (current, None)
}

/// Extract the blocked counter from the middleware's status line.
pub fn parse_sec_status(content: &str) -> Option<u64> {
    content
        .split_whitespace()
        .find_map(|field| field.strip_prefix("blocked="))
        .and_then(|count| count.parse().ok())
}

/// Replace a leading `$HOME` with `~` for display.
pub fn abbreviate_home(cwd: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if let Ok(rest) = cwd.strip_prefix(home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    cwd.display().to_string()
}

/// Everything the prompt needs from the rest of the shell.
pub struct PromptInput<'a> {
    pub backend: char,
    pub middleware: char,
    pub probe: char,
    pub user: &'a str,
    pub host: &'a str,
    pub cwd: &'a str,
    pub cache: &'a ContextCache,
}

/// Render the two-line prompt.
pub fn render(input: &PromptInput<'_>) -> String {
    let mut context = String::new();
    if let Some(ref branch) = input.cache.branch {
        context.push_str(&format!(" git:{branch}"));
    }
    if let Some(ref kube) = input.cache.kube_context {
        match input.cache.kube_namespace {
            Some(ref ns) if ns != "default" => context.push_str(&format!(" k8s:{kube}/{ns}")),
            _ => context.push_str(&format!(" k8s:{kube}")),
        }
    }
    if let Some(blocked) = input.cache.blocked_count {
        if blocked > 0 {
            context.push_str(&format!(" sec:{blocked}"));
        }
    }

    format!(
        "{}{}{} {}@{}:{}{}\n> ",
        input.backend, input.middleware, input.probe, input.user, input.host, input.cwd, context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_glyphs_are_distinct_per_state() {
        assert_eq!(backend_glyph(Health::Up, AiState::Ready), '@');
        assert_eq!(backend_glyph(Health::Up, AiState::Loading), '~');
        assert_eq!(backend_glyph(Health::Up, AiState::Failed), '!');
        assert_eq!(backend_glyph(Health::Degraded, AiState::Ready), '!');
        assert_eq!(middleware_glyph(Health::Up), '#');
        assert_eq!(middleware_glyph(Health::Degraded), '!');
        assert_eq!(probe_glyph(Health::Up), '%');
        assert_eq!(probe_glyph(Health::Starting), '~');
    }

    #[test]
    fn test_parse_git_head_branch() {
        assert_eq!(
            parse_git_head("ref: refs/heads/main\n"),
            Some("main".to_string())
        );
        assert_eq!(
            parse_git_head("ref: refs/heads/feature/x\n"),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_parse_git_head_detached() {
        assert_eq!(
            parse_git_head("0123456789abcdef0123456789abcdef01234567\n"),
            Some("01234567".to_string())
        );
    }

    #[test]
    fn test_parse_kube_config_with_namespace() {
        let content = "\
apiVersion: v1
current-context: dev
contexts:
- context:
    cluster: main
    namespace: apps
  name: dev
- context:
    cluster: other
  name: prod
";
        let (context, namespace) = parse_kube_config(content);
        assert_eq!(context.as_deref(), Some("dev"));
        assert_eq!(namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_parse_kube_config_without_namespace() {
        let content = "current-context: prod\ncontexts:\n- context:\n    cluster: c\n  name: prod\n";
        let (context, namespace) = parse_kube_config(content);
        assert_eq!(context.as_deref(), Some("prod"));
        assert_eq!(namespace, None);
    }

    #[test]
    fn test_parse_sec_status() {
        assert_eq!(
            parse_sec_status("requests=10 blocked=3 upstream_failures=0"),
            Some(3)
        );
        assert_eq!(parse_sec_status("garbage"), None);
    }

    #[test]
    fn test_abbreviate_home() {
        let home = PathBuf::from("/home/u");
        assert_eq!(
            abbreviate_home(Path::new("/home/u/src"), Some(&home)),
            "~/src"
        );
        assert_eq!(abbreviate_home(Path::new("/home/u"), Some(&home)), "~");
        assert_eq!(abbreviate_home(Path::new("/etc"), Some(&home)), "/etc");
    }

    #[test]
    fn test_render_includes_glyphs_and_context() {
        let mut cache = ContextCache::new(Duration::from_secs(5));
        cache.branch = Some("main".to_string());
        cache.blocked_count = Some(2);
        let prompt = render(&PromptInput {
            backend: '@',
            middleware: '#',
            probe: '%',
            user: "u",
            host: "box",
            cwd: "~/src",
            cache: &cache,
        });
        assert!(prompt.starts_with("@#% u@box:~/src"));
        assert!(prompt.contains("git:main"));
        assert!(prompt.contains("sec:2"));
        assert!(prompt.ends_with("\n> "));
    }

    #[test]
    fn test_zero_blocked_not_shown() {
        let mut cache = ContextCache::new(Duration::from_secs(5));
        cache.blocked_count = Some(0);
        let prompt = render(&PromptInput {
            backend: '~',
            middleware: '#',
            probe: '%',
            user: "u",
            host: "box",
            cwd: "/",
            cache: &cache,
        });
        assert!(!prompt.contains("sec:"));
    }

    #[test]
    fn test_cache_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let sec = dir.path().join("sec-status");
        std::fs::write(&sec, "requests=1 blocked=1 upstream_failures=0").unwrap();

        let mut cache = ContextCache::new(Duration::from_secs(60));
        cache.refresh_if_stale(dir.path(), &sec, None);
        assert_eq!(cache.blocked_count, Some(1));

        // Within the TTL a changed file is not re-read.
        std::fs::write(&sec, "requests=2 blocked=9 upstream_failures=0").unwrap();
        cache.refresh_if_stale(dir.path(), &sec, None);
        assert_eq!(cache.blocked_count, Some(1));
    }
}
