use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::api::client::HttpBackend;
use crate::core::config::Settings;
use crate::core::shutdown::stop_signal;
use crate::domain::draft::FileDraftStore;
use crate::session::{KeyPress, SessionController, SessionEvent, SubmitOutcome};

#[derive(Parser, Debug)]
#[command(name = "testverse-exam", version, about = "Take a TestVerse exam from the terminal")]
pub struct Cli {
    /// Exam identifier
    pub exam_id: String,

    /// Resume an existing attempt instead of starting a new one
    pub attempt_id: Option<String>,

    /// Start without network; answers are kept in the local draft only
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Next,
    Prev,
    Goto(usize),
    Section(String),
    Pick(String),
    Text(String),
    Code(String),
    Lang(String),
    Reset,
    Flag,
    Clear,
    Save,
    Review,
    Cancel,
    Submit,
    Retry,
    Online(bool),
    Key(String),
    Help,
    Quit,
}

const HELP: &str = "commands: next | prev | goto N | section NAME | pick ID | text ... | code ... | \
lang NAME | reset | flag | clear | save | review | cancel | submit | retry | offline | online | \
key KEY | quit";

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').map_or((line, ""), |(verb, rest)| (verb, rest.trim()));
    let required = |what: &str| {
        if rest.is_empty() {
            Err(format!("{verb} needs {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    match verb {
        "next" | "n" => Ok(Command::Next),
        "prev" | "p" => Ok(Command::Prev),
        "goto" | "g" => rest
            .parse::<usize>()
            .ok()
            .filter(|number| *number > 0)
            .map(|number| Command::Goto(number - 1))
            .ok_or_else(|| "goto needs a question number".to_string()),
        "section" => required("a section name").map(Command::Section),
        "pick" => required("an option id").map(Command::Pick),
        "text" => Ok(Command::Text(rest.to_string())),
        "code" => Ok(Command::Code(rest.replace("\\n", "\n"))),
        "lang" => required("a language").map(Command::Lang),
        "reset" => Ok(Command::Reset),
        "flag" | "f" => Ok(Command::Flag),
        "clear" => Ok(Command::Clear),
        "save" => Ok(Command::Save),
        "review" => Ok(Command::Review),
        "cancel" => Ok(Command::Cancel),
        "submit" => Ok(Command::Submit),
        "retry" => Ok(Command::Retry),
        "offline" => Ok(Command::Online(false)),
        "online" => Ok(Command::Online(true)),
        "key" => required("a key name").map(Command::Key),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command: {other}")),
    }
}

fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Loaded { title, exam_type, question_count, remaining, offline } => Some(format!(
            "{title} [{exam_type}] {question_count} questions, {}{}",
            crate::core::time::format_countdown(*remaining),
            if *offline { " (offline)" } else { "" }
        )),
        SessionEvent::Fatal { title, message } => Some(format!("{title}: {message}")),
        SessionEvent::QuestionShown(view) => {
            let mut out = format!(
                "\nQuestion {} of {} [{}] {}\n{}",
                view.index + 1,
                view.total,
                view.type_label,
                view.marks,
                view.text
            );
            if let Some(section) = &view.section {
                out.push_str(&format!("\nSection: {section}"));
            }
            for option in &view.options {
                let mark = if option.selected { "x" } else { " " };
                out.push_str(&format!("\n  [{mark}] {}. {} ({})", option.key, option.text, option.id));
            }
            if let Some(text) = &view.text_answer {
                out.push_str(&format!("\n  > {text}"));
            }
            if let Some(count) = &view.char_count {
                out.push_str(&format!("\n  {count}"));
            }
            if let (Some(code), Some(language)) = (&view.code, &view.language) {
                out.push_str(&format!("\n  ({language})\n{code}"));
            }
            if view.flagged {
                out.push_str("\n  flagged for review");
            }
            Some(out)
        }
        SessionEvent::ProgressChanged { progress, .. } => Some(format!(
            "{}/{} answered ({}%), {} flagged",
            progress.answered,
            progress.total,
            progress.percent(),
            progress.flagged
        )),
        // Per-second ticks would flood a line-oriented terminal.
        SessionEvent::TimerTick { remaining, display, .. } if remaining % 60 == 0 => {
            Some(format!("time left {display}"))
        }
        SessionEvent::TimerTick { .. } => None,
        SessionEvent::TimeWarning { message, urgent } => {
            Some(if *urgent { format!("!! {message}") } else { format!("! {message}") })
        }
        SessionEvent::SaveStatus(status) => Some(status.label().to_string()),
        SessionEvent::Toast(message) => Some(message.clone()),
        SessionEvent::Offline(true) => Some("You are offline. Answers are kept locally.".to_string()),
        SessionEvent::Offline(false) => Some("Back online.".to_string()),
        SessionEvent::ReviewOpened(progress) => Some(format!(
            "Review: {} answered, {} unanswered, {} flagged. Type submit to finish or cancel.",
            progress.answered, progress.unanswered, progress.flagged
        )),
        SessionEvent::ReviewClosed => None,
        SessionEvent::Submitting => Some("Submitting…".to_string()),
        SessionEvent::SubmitFailed { message } => Some(message.clone()),
        SessionEvent::Submitted { message } => Some(message.clone()),
        SessionEvent::Redirect { url } => Some(format!("Results: {url}")),
    }
}

pub(crate) async fn run(settings: Settings) -> Result<()> {
    let cli = Cli::parse();

    let backend = Arc::new(HttpBackend::from_settings(settings.api())?);
    let store = Arc::new(FileDraftStore::new(&settings.storage().draft_dir));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(line) = render_event(&event) {
                println!("{line}");
            }
        }
    });

    let booted = SessionController::boot(
        backend,
        store,
        &cli.exam_id,
        cli.attempt_id.as_deref(),
        settings.session_config(),
        cli.offline,
        events_tx,
    )
    .await;
    let controller = match booted {
        Ok(controller) => controller,
        Err(err) => {
            printer.await.ok();
            return Err(anyhow!(err)).context("exam session could not start");
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stop = stop_signal();
    tokio::pin!(stop);

    loop {
        let line = tokio::select! {
            signal = &mut stop => {
                tracing::info!(signal = signal.as_str(), "Leaving exam");
                if let Some(prompt) = controller.before_unload().await {
                    println!("{prompt}");
                }
                break;
            }
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            controller.before_unload().await;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            if let Some(prompt) = controller.before_unload().await {
                println!("{prompt}");
            }
            break;
        }
        if execute(&controller, command).await {
            break;
        }
    }

    controller.stop();
    drop(controller);
    // The printer ends once the background loops release their event senders.
    tokio::time::timeout(Duration::from_secs(2), printer).await.ok();
    Ok(())
}

/// Returns `true` once the exam is submitted.
async fn execute(controller: &SessionController, command: Command) -> bool {
    let result = match command {
        Command::Next => {
            controller.next().await;
            Ok(())
        }
        Command::Prev => {
            controller.prev().await;
            Ok(())
        }
        Command::Goto(index) => {
            controller.navigate(index).await;
            Ok(())
        }
        Command::Section(name) => {
            if controller.jump_to_section(&name).await.is_none() {
                println!("no section named {name}");
            }
            Ok(())
        }
        Command::Pick(option) => controller.select_option(&option).await,
        Command::Text(text) => controller.set_text(&text).await,
        Command::Code(code) => controller.set_code(&code).await,
        Command::Lang(language) => controller.set_language(&language).await,
        Command::Reset => controller.reset_code().await,
        Command::Flag => controller.toggle_flag().await.map(|_| ()),
        Command::Clear => controller.clear_answer().await,
        Command::Save => {
            controller.manual_save().await;
            Ok(())
        }
        Command::Review => {
            controller.open_review().await;
            Ok(())
        }
        Command::Cancel => {
            controller.cancel_review().await;
            Ok(())
        }
        Command::Submit => return matches!(controller.submit().await, SubmitOutcome::Submitted { .. }),
        Command::Retry => return matches!(controller.retry().await, SubmitOutcome::Submitted { .. }),
        Command::Online(online) => {
            controller.set_online(online).await;
            Ok(())
        }
        Command::Key(key) => {
            controller.handle_key(&KeyPress::new(&key)).await;
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(err) = result {
        println!("{err}");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timer::TimerLevel;

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(parse_command("goto 3"), Ok(Command::Goto(2)));
        assert_eq!(parse_command("  pick o1 "), Ok(Command::Pick("o1".to_string())));
        assert_eq!(parse_command("code print(1)\\nprint(2)"), Ok(Command::Code("print(1)\nprint(2)".to_string())));
        assert_eq!(parse_command("text"), Ok(Command::Text(String::new())));
        assert_eq!(parse_command("offline"), Ok(Command::Online(false)));
        assert!(parse_command("goto 0").is_err());
        assert!(parse_command("lang").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn ticks_render_once_a_minute() {
        let tick = |remaining| SessionEvent::TimerTick {
            remaining,
            display: crate::core::time::format_countdown(remaining),
            level: TimerLevel::for_remaining(remaining),
        };
        assert_eq!(render_event(&tick(120)).as_deref(), Some("time left 02:00"));
        assert_eq!(render_event(&tick(119)), None);
    }
}
