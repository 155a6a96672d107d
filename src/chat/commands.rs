#[derive(Debug, Clone, PartialEq)]
pub enum SlashCommand {
    Help,
    Stats,
    Models,
    Model { action: ModelAction },
    Image { prompt: String },
    Forget,
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    Show,
    Set(String),
}

pub struct CommandParser;

impl CommandParser {
    pub fn parse(input: &str) -> Option<SlashCommand> {
        let input = input.trim();
        let input = input.strip_prefix('/')?;

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        if command.is_empty() {
            return Some(SlashCommand::Help);
        }

        match command.to_lowercase().as_str() {
            "help" | "?" => Some(SlashCommand::Help),
            "stats" => Some(SlashCommand::Stats),
            "models" => Some(SlashCommand::Models),
            "model" => Some(parse_model_command(rest)),
            "image" | "img" => Some(parse_image_command(rest)),
            "forget" => Some(SlashCommand::Forget),
            "quit" | "exit" => Some(SlashCommand::Quit),
            _ => Some(SlashCommand::Unknown(command.to_string())), // original case for the message
        }
    }
}

fn parse_model_command(rest: &str) -> SlashCommand {
    match rest.split_whitespace().next() {
        None => SlashCommand::Model {
            action: ModelAction::Show,
        },
        Some(name) => SlashCommand::Model {
            action: ModelAction::Set(name.to_string()),
        },
    }
}

fn parse_image_command(rest: &str) -> SlashCommand {
    if rest.is_empty() {
        return SlashCommand::Unknown("image requires a prompt".to_string());
    }
    SlashCommand::Image {
        prompt: rest.to_string(),
    }
}

pub fn help_text() -> &'static str {
    "Available commands:\n\
     \x20 /help            Show this help\n\
     \x20 /stats           Provider health and usage\n\
     \x20 /models          Models offered by each provider\n\
     \x20 /model [name]    Show or switch the active model\n\
     \x20 /image <prompt>  Generate an image\n\
     \x20 /forget          Clear conversation memory\n\
     \x20 /quit            Leave the chat\n\
     Anything else is sent as a text prompt."
}
