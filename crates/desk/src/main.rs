use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use pumpdesk::chat::{ChatCommand, ChatController, SessionSlot};
use pumpdesk::cli::{Args, InputAction, parse_input, starts_turn};
use pumpdesk::content::{BUSY_NOTICE, SYSTEM_INSTRUCTION};
use pumpdesk::render::{TranscriptPrinter, render_contact_card, render_help, render_quick_actions};
use pumpdesk::settings::SettingsStore;
use pumpdesk_llm::{SessionConfig, create_provider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the transcript on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = SettingsStore::new(
        args.config
            .clone()
            .unwrap_or_else(SettingsStore::default_config_path),
    );

    if args.init_config {
        return match store.init_config() {
            Ok(true) => {
                println!("wrote {}", store.config_path().display());
                ExitCode::SUCCESS
            }
            Ok(false) => {
                println!("{} already exists", store.config_path().display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to write settings");
                ExitCode::FAILURE
            }
        };
    }

    let settings = store.settings();
    let session_config = settings.session_config().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "using bundled system instruction");
        SessionConfig::new(settings.model_name(), SYSTEM_INSTRUCTION)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens)
    });
    let provider = create_provider(settings.to_provider_config()).map_err(|error| {
        tracing::error!(error = %error, "model provider unavailable");
        error.to_string()
    });

    let mut controller = ChatController::new(SessionSlot::new(provider, session_config));
    controller.mount();
    let mut snapshots = controller.subscribe();
    let status = snapshots.clone();

    {
        let mut stdout = std::io::stdout().lock();
        let _ = render_quick_actions(&mut stdout).and_then(|()| render_help(&mut stdout));
    }

    let (commands, command_rx) = mpsc::unbounded_channel();
    let controller_task = tokio::spawn(controller.run(command_rx));

    let timestamps = args.timestamps;
    let ansi = std::io::stdout().is_terminal();
    let render_task = tokio::spawn(async move {
        let mut printer = TranscriptPrinter::new(timestamps, ansi);
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            let rendered = {
                let mut stdout = std::io::stdout().lock();
                printer.render(&snapshot, &mut stdout)
            };
            if let Err(error) = rendered {
                tracing::warn!(error = %error, "failed to render transcript");
                break;
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(error = %error, "failed to read input");
                break;
            }
        };

        let command = match parse_input(&line) {
            InputAction::Command(command) => command,
            InputAction::ShowContact => {
                let mut stdout = std::io::stdout().lock();
                let _ = render_contact_card(&mut stdout).and_then(|()| stdout.flush());
                continue;
            }
            InputAction::ShowHelp => {
                let mut stdout = std::io::stdout().lock();
                let _ = render_quick_actions(&mut stdout).and_then(|()| render_help(&mut stdout));
                continue;
            }
        };

        if starts_turn(&command) && status.borrow().loading {
            tracing::debug!(?command, "input ignored while a reply is streaming");
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{BUSY_NOTICE}").and_then(|()| stdout.flush());
            continue;
        }

        let quit = command == ChatCommand::Quit;
        if commands.send(command).is_err() || quit {
            break;
        }
    }

    let _ = commands.send(ChatCommand::Quit);
    if let Err(error) = controller_task.await {
        tracing::error!(error = %error, "chat controller task failed");
        return ExitCode::FAILURE;
    }
    let _ = render_task.await;
    ExitCode::SUCCESS
}
