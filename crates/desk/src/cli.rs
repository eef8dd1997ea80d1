use std::path::PathBuf;

use clap::Parser;

use crate::chat::ChatCommand;

#[derive(Debug, Parser)]
#[command(name = "pumpdesk")]
#[command(version, about = "Terminal support chat for Thai Khuong Pump", long_about = None)]
pub struct Args {
    /// Settings file to load instead of the per-user default
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write a default settings file and exit
    #[arg(long)]
    pub init_config: bool,

    /// Prefix messages with their local time
    #[arg(long)]
    pub timestamps: bool,
}

/// What one line of terminal input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Command(ChatCommand),
    ShowContact,
    ShowHelp,
}

/// Maps `/`-prefixed words to commands; everything else is a message.
pub fn parse_input(line: &str) -> InputAction {
    let Some(word) = line.trim().strip_prefix('/') else {
        return InputAction::Command(ChatCommand::Send(line.to_string()));
    };

    match word {
        "reset" => InputAction::Command(ChatCommand::Reset),
        "stop" => InputAction::Command(ChatCommand::Stop),
        "quit" | "exit" => InputAction::Command(ChatCommand::Quit),
        "contact" => InputAction::ShowContact,
        other => match other.parse::<usize>() {
            Ok(number) if number > 0 => InputAction::Command(ChatCommand::QuickAction(number - 1)),
            _ => InputAction::ShowHelp,
        },
    }
}

/// Commands that open a new turn and so are refused while a reply is streaming.
pub fn starts_turn(command: &ChatCommand) -> bool {
    match command {
        ChatCommand::Send(text) => !text.trim().is_empty(),
        ChatCommand::QuickAction(_) => true,
        ChatCommand::Stop | ChatCommand::Reset | ChatCommand::Quit => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_verbatim() {
        assert_eq!(
            parse_input("  bơm màng? "),
            InputAction::Command(ChatCommand::Send("  bơm màng? ".to_string()))
        );
        assert_eq!(
            parse_input(""),
            InputAction::Command(ChatCommand::Send(String::new()))
        );
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(parse_input("/reset"), InputAction::Command(ChatCommand::Reset));
        assert_eq!(parse_input(" /stop "), InputAction::Command(ChatCommand::Stop));
        assert_eq!(parse_input("/exit"), InputAction::Command(ChatCommand::Quit));
        assert_eq!(parse_input("/contact"), InputAction::ShowContact);
        assert_eq!(parse_input("/what"), InputAction::ShowHelp);
    }

    #[test]
    fn quick_actions_are_one_based() {
        assert_eq!(
            parse_input("/1"),
            InputAction::Command(ChatCommand::QuickAction(0))
        );
        assert_eq!(parse_input("/0"), InputAction::ShowHelp);
    }

    #[test]
    fn only_messages_and_quick_actions_start_turns() {
        assert!(starts_turn(&ChatCommand::Send("bơm màng".to_string())));
        assert!(starts_turn(&ChatCommand::QuickAction(2)));
        assert!(!starts_turn(&ChatCommand::Send("   ".to_string())));
        assert!(!starts_turn(&ChatCommand::Stop));
        assert!(!starts_turn(&ChatCommand::Reset));
    }

    #[test]
    fn args_accept_config_path() {
        let args = Args::parse_from(["pumpdesk", "--config", "/tmp/settings.json", "--init-config"]);

        assert_eq!(args.config, Some(PathBuf::from("/tmp/settings.json")));
        assert!(args.init_config);
        assert!(!args.timestamps);
    }
}
