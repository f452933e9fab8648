use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::ai::Provider;
use crate::client::queue::find;
use crate::client::{
    AttachmentRequest, ChatSession, DocumentUpdate, FileSettingsStore, HttpTransport, QueueItem,
    SettingsStore, SubmitError, TurnOutcome, UpdateReceiver, load_queue,
    spawn_active_extraction, spawn_attachment_extraction,
};
use crate::extract::DocumentSource;

const HELP: &str = "Commands:
  /open <path|url>         view a document and use it as context
  /attach <path|url>...    attach one or more documents
  /queue                   list the study queue
  /pick <id>               attach a study queue item
  /detach <n>              remove attachment number n
  /context                 show what will be sent with the next message
  /ack                     acknowledge an error and continue
  /quit                    exit";

#[derive(Debug, PartialEq)]
enum Input {
    Open(String),
    Attach(Vec<String>),
    Queue,
    Pick(String),
    Detach(usize),
    Context,
    Ack,
    Help,
    Quit,
    Message(String),
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(Input::Message(line.to_string()));
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let args: Vec<String> = words.map(str::to_string).collect();

    let single = |usage: &str| match args.as_slice() {
        [arg] => Ok(arg.clone()),
        _ => Err(format!("Usage: {}", usage)),
    };

    match command {
        "/open" => single("/open <path|url>").map(Input::Open),
        "/attach" if args.is_empty() => Err(String::from("Usage: /attach <path|url>...")),
        "/attach" => Ok(Input::Attach(args)),
        "/queue" => Ok(Input::Queue),
        "/pick" => single("/pick <id>").map(Input::Pick),
        "/detach" => {
            let n = single("/detach <n>")?;
            match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Input::Detach(n - 1)),
                _ => Err(format!("Not an attachment number: {}", n)),
            }
        }
        "/context" => Ok(Input::Context),
        "/ack" => Ok(Input::Ack),
        "/help" => Ok(Input::Help),
        "/quit" | "/exit" => Ok(Input::Quit),
        other => Err(format!("Unknown command {}. Try /help", other)),
    }
}

fn warn_all(warnings: &[String]) {
    for w in warnings {
        println!("Warning: {}", w);
    }
}

fn settings_hint(provider: Provider) -> String {
    format!(
        "Run `studychat settings --provider {} --credential <key>` first.",
        provider
    )
}

/// What to tell the user once a message has been handled.
fn describe_outcome(outcome: &Result<TurnOutcome, SubmitError>, provider: Provider) -> String {
    match outcome {
        Ok(TurnOutcome::Completed) => String::new(),
        Ok(TurnOutcome::Failed(error)) => format!("\nError: {}\nType /ack to continue.", error),
        Ok(TurnOutcome::NeedsSettings(error)) => format!(
            "\nError: {}\n{}\nType /ack to continue.",
            error,
            settings_hint(provider)
        ),
        Err(SubmitError::MissingCredential(provider)) => format!(
            "No API key set for {}. {}",
            provider,
            settings_hint(*provider)
        ),
        Err(e) => e.to_string(),
    }
}

/// Applies a finished background extraction and reports it.
fn report_update(session: &mut ChatSession, update: DocumentUpdate) {
    let viewed = match &update {
        DocumentUpdate::Active { ticket, .. } => Some(ticket.title().to_string()),
        DocumentUpdate::Attachments(results) => {
            for r in results.iter().filter(|r| r.result.is_ok()) {
                println!("Attached {}", r.name);
            }
            None
        }
    };
    let warnings = session.apply_update(update);
    if let Some(title) = viewed {
        if warnings.is_empty() && session.active_context().is_some_and(|a| a.title == title) {
            println!("Viewing {}", title);
        }
    }
    warn_all(&warnings);
}

fn drain_updates(session: &mut ChatSession, updates: &mut UpdateReceiver) {
    while let Ok(update) = updates.try_recv() {
        report_update(session, update);
    }
}

fn print_context(session: &ChatSession) {
    match session.active_context() {
        Some(active) => println!(
            "Viewing: {} ({} chars)",
            active.title,
            active.extracted_text.len()
        ),
        None => println!("Viewing: nothing"),
    }
    if session.attachments().is_empty() {
        println!("Attachments: none");
    } else {
        println!("Attachments:");
        for (i, a) in session.attachments().iter().enumerate() {
            println!(
                "  {}. {} ({} chars, {:?})",
                i + 1,
                a.name,
                a.extracted_text.len(),
                a.origin
            );
        }
    }
    match session.context() {
        Some(context) => println!("Context: {} chars", context.len()),
        None => println!("Context: none"),
    }
}

fn print_queue(queue: &[QueueItem]) {
    if queue.is_empty() {
        println!("The study queue is empty. Pass one with --queue <file>");
    }
    for item in queue {
        println!("  [{}] {}", item.id, item.title);
    }
}

pub async fn run(server: &str, queue_path: Option<PathBuf>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let store = FileSettingsStore::new(FileSettingsStore::default_path()?);
    let settings = store.load()?;
    let transport = HttpTransport::new(server);
    let queue = match queue_path {
        Some(path) => load_queue(path).await?,
        None => Vec::new(),
    };
    let mut session = ChatSession::new();
    let (updates_tx, mut updates) = mpsc::unbounded_channel();

    println!(
        "Chatting with {} ({}) via {}. Type /help for commands.",
        settings.provider,
        settings.provider.model_id(),
        server
    );

    loop {
        drain_updates(&mut session, &mut updates);
        let readline = rl.readline(">>> ");
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());
        // Pick up anything that finished while the prompt was open
        drain_updates(&mut session, &mut updates);

        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        match input {
            Input::Open(reference) => match DocumentSource::parse(&reference).await {
                Ok(source) => {
                    let ticket = session.view_document(source.name());
                    println!("Loading {}", source.name());
                    spawn_active_extraction(ticket, source, updates_tx.clone());
                }
                Err(e) => warn_all(&[e.to_string()]),
            },
            Input::Attach(references) => {
                let mut warnings = Vec::new();
                let mut requests = Vec::new();
                for reference in references {
                    match DocumentSource::parse(&reference).await {
                        Ok(source) => requests.push(AttachmentRequest::upload(source)),
                        Err(e) => warnings.push(e.to_string()),
                    }
                }
                warn_all(&warnings);
                if !requests.is_empty() {
                    println!("Extracting {} attachment(s)", requests.len());
                    spawn_attachment_extraction(requests, updates_tx.clone());
                }
            }
            Input::Queue => print_queue(&queue),
            Input::Pick(id) => match find(&queue, &id) {
                Some(item) => {
                    println!("Extracting {}", item.title);
                    spawn_attachment_extraction(
                        vec![AttachmentRequest::from_queue(item)],
                        updates_tx.clone(),
                    );
                }
                None => println!("No queue item {}", id),
            },
            Input::Detach(index) => match session.remove_attachment(index) {
                Some(removed) => println!("Removed {}", removed.name),
                None => println!("No attachment number {}", index + 1),
            },
            Input::Context => print_context(&session),
            Input::Ack => match session.acknowledge_error() {
                Some(error) => println!("Dismissed: {}", error),
                None => println!("Nothing to acknowledge"),
            },
            Input::Help => println!("{}", HELP),
            Input::Quit => break,
            Input::Message(text) => {
                let outcome = session
                    .run_turn_with_updates(
                        &transport,
                        &text,
                        &settings,
                        &mut updates,
                        |delta| {
                            print!("{}", delta);
                            let _ = io::stdout().flush();
                        },
                        |warning| println!("\nWarning: {}", warning),
                    )
                    .await;
                println!("{}", describe_outcome(&outcome, settings.provider));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        assert_eq!(
            parse_input("  what is osmosis? ").unwrap(),
            Input::Message("what is osmosis?".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_input("/open unit1.pdf").unwrap(),
            Input::Open("unit1.pdf".to_string())
        );
        assert_eq!(
            parse_input("/attach a.pdf https://x.test/b.pdf").unwrap(),
            Input::Attach(vec!["a.pdf".to_string(), "https://x.test/b.pdf".to_string()])
        );
        assert_eq!(parse_input("/detach 2").unwrap(), Input::Detach(1));
        assert_eq!(parse_input("/pick u1").unwrap(), Input::Pick("u1".to_string()));
        assert_eq!(parse_input("/quit").unwrap(), Input::Quit);
    }

    #[test]
    fn test_invalid_request_shows_settings_hint() {
        let outcome = Ok(TurnOutcome::NeedsSettings("Invalid provider".to_string()));
        let message = describe_outcome(&outcome, Provider::Google);
        assert!(message.contains("Invalid provider"));
        assert!(message.contains("studychat settings --provider google"));

        let missing = describe_outcome(
            &Err(SubmitError::MissingCredential(Provider::Google)),
            Provider::Google,
        );
        assert!(missing.contains("studychat settings --provider google"));

        let failed = describe_outcome(
            &Ok(TurnOutcome::Failed("Overloaded".to_string())),
            Provider::Google,
        );
        assert!(!failed.contains("studychat settings"));
    }

    #[test]
    fn test_parse_bad_commands() {
        assert!(parse_input("/open").is_err());
        assert!(parse_input("/attach").is_err());
        assert!(parse_input("/detach 0").is_err());
        assert!(parse_input("/detach two").is_err());
        assert!(parse_input("/frobnicate").is_err());
    }
}
