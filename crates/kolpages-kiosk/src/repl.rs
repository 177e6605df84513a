//! Interactive operator console for a running kiosk.
//!
//! Type `/help` for available commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use crate::kiosk::Kiosk;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/sites", "List configured sites"),
    ("/open", "Open a site by name"),
    ("/type", "Type text into the focused field"),
    ("/space", "Type a space"),
    ("/backspace", "Delete the last character"),
    ("/enter", "Press Enter"),
    ("/back", "Go back in history"),
    ("/reload", "Reload the page"),
    ("/url", "Show the current URL"),
    ("/status", "Show destination and upkeep state"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Close the kiosk"),
];

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Sites,
    Open(String),
    Type(String),
    Backspace,
    Enter,
    Back,
    Reload,
    Url,
    Status,
    Help,
    Clear,
    Exit,
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<ReplCommand> {
    let line = line.trim_start();
    if line.trim_end().is_empty() {
        return None;
    }
    let input = line.strip_prefix('/').unwrap_or(line);
    if input.trim_end().is_empty() {
        return Some(ReplCommand::Help);
    }

    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let raw_args = parts.next().unwrap_or("");

    let command = match cmd {
        "exit" | "quit" => ReplCommand::Exit,
        "help" | "h" | "?" => ReplCommand::Help,
        "clear" | "cls" => ReplCommand::Clear,
        "sites" | "ls" => ReplCommand::Sites,
        "open" | "o" => ReplCommand::Open(raw_args.trim().to_string()),
        // Text is typed as given, including inner and trailing spaces.
        "type" | "t" => ReplCommand::Type(raw_args.to_string()),
        "space" => ReplCommand::Type(" ".to_string()),
        "backspace" | "bs" => ReplCommand::Backspace,
        "enter" => ReplCommand::Enter,
        "back" => ReplCommand::Back,
        "reload" | "r" => ReplCommand::Reload,
        "url" => ReplCommand::Url,
        "status" => ReplCommand::Status,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// REPL helper for tab completion.
struct KioskHelper {
    sites: Vec<String>,
}

impl Completer for KioskHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // Site name completion
        let parts: Vec<&str> = input.splitn(2, ' ').collect();
        let cmd = parts[0];
        let args = if parts.len() > 1 { parts[1] } else { "" };

        if cmd == "/open" {
            let prefix = args.trim_start().to_lowercase();
            let prefix_start = input.len() - args.trim_start().len();
            let matches: Vec<Pair> = self
                .sites
                .iter()
                .filter(|s| s.to_lowercase().starts_with(&prefix))
                .map(|s| Pair {
                    display: s.clone(),
                    replacement: s.clone(),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for KioskHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for KioskHelper {}
impl Validator for KioskHelper {}
impl Helper for KioskHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

type KioskEditor = Editor<KioskHelper, DefaultHistory>;

/// Run the console until `/exit` or Ctrl+D. Requires the multi-thread runtime.
pub async fn run(kiosk: &Kiosk) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mkolpages v{}\x1b[0m \x1b[90m- kiosk console\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: KioskEditor = Editor::with_config(config)?;
    rl.set_helper(Some(KioskHelper {
        sites: kiosk
            .config()
            .visible_sites()
            .map(|s| s.name.clone())
            .collect(),
    }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".kolpages_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    loop {
        // Readline blocks; keep the owner loop and upkeep timer running meanwhile.
        let result = tokio::task::block_in_place(|| rl.readline(" \x1b[36mkiosk>\x1b[0m "));

        match result {
            Ok(line) => {
                let Some(command) = parse_command(&line) else {
                    continue;
                };
                if command == ReplCommand::Exit {
                    eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                    break;
                }
                execute(kiosk, command).await;
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

async fn execute(kiosk: &Kiosk, command: ReplCommand) {
    let orchestrator = kiosk.orchestrator();
    let executor = orchestrator.executor();
    let result = match command {
        ReplCommand::Sites => {
            cmd_sites(kiosk);
            Ok(())
        }
        ReplCommand::Open(name) => return cmd_open(kiosk, &name).await,
        ReplCommand::Type(text) => executor.insert_text(&text).await,
        ReplCommand::Backspace => executor.delete_last_character().await,
        ReplCommand::Enter => executor.press_enter().await,
        ReplCommand::Back => orchestrator.go_back().await,
        ReplCommand::Reload => orchestrator.reload().await,
        ReplCommand::Url => {
            eprintln!("  {}", orchestrator.current_url().await);
            Ok(())
        }
        ReplCommand::Status => {
            cmd_status(kiosk).await;
            Ok(())
        }
        ReplCommand::Help => {
            cmd_help();
            Ok(())
        }
        ReplCommand::Clear => {
            eprint!("\x1b[2J\x1b[H");
            Ok(())
        }
        ReplCommand::Exit => Ok(()),
        ReplCommand::Unknown(cmd) => {
            eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("  Failed: {e}");
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands and site names.");
    eprintln!();
}

fn cmd_sites(kiosk: &Kiosk) {
    let marker = &kiosk.config().patching.continuous_marker;
    eprintln!();
    for site in kiosk.config().visible_sites() {
        let upkeep = if site.wants_continuous(marker) {
            " \x1b[33m(continuous)\x1b[0m"
        } else {
            ""
        };
        eprintln!("    {:<20} {}{upkeep}", site.name, site.url);
    }
    eprintln!();
}

async fn cmd_open(kiosk: &Kiosk, name: &str) {
    if name.is_empty() {
        eprintln!("  Usage: /open <site>");
        return;
    }
    match kiosk.open(name).await {
        Ok(outcome) if outcome.success => eprintln!("  Opened {}", outcome.final_url),
        Ok(outcome) => eprintln!("  Navigation failed (now at {})", outcome.final_url),
        Err(e) => eprintln!("  {e}"),
    }
}

async fn cmd_status(kiosk: &Kiosk) {
    let orchestrator = kiosk.orchestrator();
    eprintln!();
    match orchestrator.current_destination().await {
        Some(site) => eprintln!("  Destination: {} ({})", site.name, site.url),
        None => eprintln!("  Destination: none"),
    }
    eprintln!("  Page:        {}", orchestrator.current_url().await);
    eprintln!("  Generation:  {}", orchestrator.current_generation().await);
    eprintln!(
        "  Upkeep:      {}",
        if orchestrator.upkeep_armed().await {
            "armed"
        } else {
            "idle"
        }
    );
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("/"), Some(ReplCommand::Help));
    }

    #[test]
    fn test_open_trims_site_name() {
        assert_eq!(
            parse_command("/open   Tora  "),
            Some(ReplCommand::Open("Tora".into()))
        );
        assert_eq!(parse_command("open"), Some(ReplCommand::Open(String::new())));
    }

    #[test]
    fn test_type_keeps_spaces() {
        assert_eq!(
            parse_command("/type hello world "),
            Some(ReplCommand::Type("hello world ".into()))
        );
        assert_eq!(parse_command("/space"), Some(ReplCommand::Type(" ".into())));
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!(parse_command("/quit"), Some(ReplCommand::Exit));
        assert_eq!(parse_command("bs"), Some(ReplCommand::Backspace));
        assert_eq!(
            parse_command("/frobnicate now"),
            Some(ReplCommand::Unknown("frobnicate".into()))
        );
    }
}
