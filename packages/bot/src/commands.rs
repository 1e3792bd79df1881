//! Parsing of chat commands.

use bot_core::Parameter;

use crate::resources::ResourceKind;

/// What a user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the settings panel.
    Start,
    Generate,
    Help,
    /// Unload the model from memory.
    Clear,
    ApplyDefault,
    ApplyLast,
    /// Queue another run with the last generated settings.
    Repeat,
    Status,
    Set { param: Parameter, value: String },
    List(ResourceKind),
    /// Plain text, used as the prompt.
    Prompt(String),
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(body) = text.strip_prefix('/') else {
            return Command::Prompt(text.to_string());
        };

        let (head, args) = match body.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (body, ""),
        };
        // `/generate@my_bot` addresses a specific bot in group chats.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        match name.as_str() {
            "start" | "s" => Command::Start,
            "generate" | "g" => Command::Generate,
            "help" | "h" => Command::Help,
            "clear" => Command::Clear,
            "default" => Command::ApplyDefault,
            "last" => Command::ApplyLast,
            "repeat" | "r" => Command::Repeat,
            "status" => Command::Status,
            "models" => Command::List(ResourceKind::Models),
            "loras" => Command::List(ResourceKind::Loras),
            "vaes" => Command::List(ResourceKind::Vaes),
            "samplers" => Command::List(ResourceKind::Samplers),
            other => match setter(other) {
                Some(param) => Command::Set {
                    param,
                    value: args.to_string(),
                },
                None => Command::Unknown(format!("/{head}")),
            },
        }
    }
}

fn setter(name: &str) -> Option<Parameter> {
    match name.strip_prefix("set_") {
        Some(param) => param.parse().ok(),
        None => Parameter::from_alias(name),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn short_and_long_forms() {
        assert_eq!(Command::parse("/s"), Command::Start);
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/G"), Command::Generate);
        assert_eq!(Command::parse("/help@image_bot"), Command::Help);
        assert_eq!(Command::parse("/loras"), Command::List(ResourceKind::Loras));
    }

    #[test]
    fn setters_keep_the_whole_argument() {
        assert_eq!(
            Command::parse("/sp  a castle,  at night "),
            Command::Set {
                param: Parameter::Prompt,
                value: "a castle,  at night".to_string()
            }
        );
        assert_eq!(
            Command::parse("/set_cfg_scale 6.5"),
            Command::Set {
                param: Parameter::CfgScale,
                value: "6.5".to_string()
            }
        );
        assert_eq!(
            Command::parse("/set_seed"),
            Command::Set {
                param: Parameter::Seed,
                value: String::new()
            }
        );
    }

    #[test]
    fn text_and_unknown_commands() {
        assert_eq!(
            Command::parse("  a red fox "),
            Command::Prompt("a red fox".to_string())
        );
        assert_eq!(
            Command::parse("/set_colour blue"),
            Command::Unknown("/set_colour".to_string())
        );
        assert_eq!(Command::parse("/xyz"), Command::Unknown("/xyz".to_string()));
    }
}
