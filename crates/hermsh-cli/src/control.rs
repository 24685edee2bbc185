//! Control-command parsing.
//!
//! Control commands live in the reserved `hrm` namespace and are handled
//! entirely by the front end. Setting changes are persisted to the config
//! file and propagated to the backend through the ordinary request channel.

use hermsh_config::Provider;

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCmd {
    /// `hrmh` — help.
    Help,
    /// `hrms` — status snapshot.
    Status,
    /// `hrmv` — show current verbosity.
    VerboseGet,
    /// `hrmv <0|1|2>` — set verbosity.
    VerboseSet(u8),
    /// `hrma` — show current provider.
    ProviderGet,
    /// `hrma <provider>` — switch provider.
    ProviderSet(Provider),
}

pub const HELP_TEXT: &str = "\
hermsh control commands:

  hrmh               show this help
  hrms               status snapshot (AI, children, provider, model)

  hrmv               show verbosity level
  hrmv 0|1|2         set verbosity (0 silent, 1 info, 2 debug)

  hrma               show AI provider and model
  hrma anthropic     switch to Anthropic (takes effect next session)
  hrma openai        switch to OpenAI (takes effect next session)

All control commands use the reserved 'hrm' prefix and never leave the
shell process.";

/// Parse a control line. `Err` carries the usage message to print.
pub fn parse(line: &str) -> Result<ControlCmd, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("usage: {cmd} [arg]"));
    }

    match (cmd, arg) {
        ("hrmh", None) => Ok(ControlCmd::Help),
        ("hrms", None) => Ok(ControlCmd::Status),
        ("hrmv", None) => Ok(ControlCmd::VerboseGet),
        ("hrmv", Some(level)) => match level {
            "0" | "off" => Ok(ControlCmd::VerboseSet(0)),
            "1" | "on" => Ok(ControlCmd::VerboseSet(1)),
            "2" => Ok(ControlCmd::VerboseSet(2)),
            _ => Err("usage: hrmv [0|1|2|on|off]".to_string()),
        },
        ("hrma", None) => Ok(ControlCmd::ProviderGet),
        ("hrma", Some(provider)) => provider
            .parse::<Provider>()
            .map(ControlCmd::ProviderSet)
            .map_err(|_| "usage: hrma [anthropic|openai]".to_string()),
        _ => Err(format!("unknown control command: {cmd} (try hrmh)")),
    }
}
