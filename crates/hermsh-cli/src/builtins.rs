//! In-process builtins: `cd`, `pwd`, `exit`.
//!
//! Working-directory changes happen only here — never in the probe and
//! never in a child shell, where they would be lost on exit.

use std::path::PathBuf;

/// What the REPL should do after a builtin ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinOutcome {
    /// Keep prompting.
    Continue,
    /// The working directory changed; dependents need resyncing.
    ChangedDir(PathBuf),
    /// `exit` was requested.
    Exit,
}

/// Resolve the target directory of a `cd` line. Bare `cd` goes home.
pub fn cd_target(line: &str, home: Option<&str>) -> Option<PathBuf> {
    let mut parts = line.split_whitespace();
    let _cd = parts.next();
    match parts.next() {
        Some("~") | None => home.map(PathBuf::from),
        Some(path) if path.starts_with("~/") => home.map(|h| PathBuf::from(h).join(&path[2..])),
        Some(path) => Some(PathBuf::from(path)),
    }
}

/// Execute one builtin line.
pub fn handle(line: &str) -> BuiltinOutcome {
    let first = line.split_whitespace().next().unwrap_or_default();
    match first {
        "exit" => BuiltinOutcome::Exit,
        "pwd" => {
            match std::env::current_dir() {
                Ok(cwd) => println!("{}", cwd.display()),
                Err(e) => eprintln!("pwd: {e}"),
            }
            BuiltinOutcome::Continue
        }
        "cd" => {
            let home = std::env::var("HOME").ok();
            let Some(target) = cd_target(line, home.as_deref()) else {
                eprintln!("cd: HOME not set");
                return BuiltinOutcome::Continue;
            };
            match std::env::set_current_dir(&target) {
                Ok(()) => match std::env::current_dir() {
                    Ok(cwd) => BuiltinOutcome::ChangedDir(cwd),
                    Err(_) => BuiltinOutcome::ChangedDir(target),
                },
                Err(e) => {
                    eprintln!("cd: {}: {e}", target.display());
                    BuiltinOutcome::Continue
                }
            }
        }
        _ => BuiltinOutcome::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cd_target_with_path() {
        assert_eq!(
            cd_target("cd /srv/app", Some("/home/u")),
            Some(PathBuf::from("/srv/app"))
        );
    }

    #[test]
    fn test_cd_bare_goes_home() {
        assert_eq!(cd_target("cd", Some("/home/u")), Some(PathBuf::from("/home/u")));
        assert_eq!(cd_target("cd ~", Some("/home/u")), Some(PathBuf::from("/home/u")));
    }

    #[test]
    fn test_cd_tilde_expansion() {
        assert_eq!(
            cd_target("cd ~/src", Some("/home/u")),
            Some(PathBuf::from("/home/u/src"))
        );
    }

    #[test]
    fn test_cd_no_home() {
        assert_eq!(cd_target("cd", None), None);
    }

    #[test]
    fn test_exit_outcome() {
        assert_eq!(handle("exit"), BuiltinOutcome::Exit);
    }
}
