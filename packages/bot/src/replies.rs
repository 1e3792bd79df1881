//! Texts the bot sends back.

use bot_core::{GenerationSettings, Parameter, QueueStatus};

use crate::resources::ResourceKind;

pub const ACCESS_DENIED: &str = "Sorry, you do not have access to this bot.";
pub const QUEUED: &str = "🔄 Request added to the queue. Waiting for generation to start.";
pub const PREPARING: &str = "🔄 Preparing generation...";
pub const LORA_LOADING: &str = "🔄 Loading LoRA...";
pub const GENERATING: &str = "🚀 Generation started...";
pub const FINISHED: &str = "✅ Generation finished!";
pub const MODEL_UNLOADED: &str = "Model unloaded from memory.";
pub const NOTHING_TO_REPEAT: &str = "No settings available to repeat a generation yet.";
pub const NO_LAST_SETTINGS: &str = "No previous settings yet; generate something first.";

pub const HELP: &str = "\
🤖 Image generation bot

Commands:
/start or /s - Show the settings panel
/generate or /g - Generate with the current settings
/repeat - Generate again with the last settings
/default - Restore the default settings
/last - Restore the last generated settings
/status - Show the queue
/clear - Unload the model from memory
/help or /h - Show this message

Quick settings:
/set_model or /sm <model>
/set_vae or /sv <vae>
/set_lora or /sl <lora>
/set_sampler or /ss <sampler>
/set_cfg_scale or /sc <value>
/set_steps or /st <count>
/set_size or /sz <width>x<height>
/set_prompt or /sp <prompt>
/set_negative_prompt or /sn <negative prompt>
/set_seed <number or random>

Lists: /models /loras /vaes /samplers

Any other text becomes the prompt.";

/// Current settings, one parameter per line.
pub fn settings_panel(settings: &GenerationSettings, has_last: bool) -> String {
    let mut text = String::from("Generation settings:\n");
    for param in Parameter::ALL {
        text.push_str(&format!("{}: {}\n", param.label(), settings.display_value(param)));
    }
    text.push_str("\n/generate to start, /default to reset");
    if has_last {
        text.push_str(", /last to restore the last settings");
    }
    text
}

/// Position report for a request still waiting in the queue.
pub fn queue_position(status: &QueueStatus) -> String {
    format!(
        "🔄 Your request is in the queue.\nPosition: {}\nCurrent job: {}\nRunning for: {:.2}s",
        status.pending,
        status
            .current_job_name()
            .map_or("none", |name| name.as_str()),
        status.elapsed_secs()
    )
}

/// Progress of the running request, with the queue behind it.
pub fn progress(stage: &str, status: &QueueStatus) -> String {
    format!(
        "{stage}\nIn queue: {}\nRunning for: {:.2}s",
        status.pending,
        status.elapsed_secs()
    )
}

pub fn queue_status(status: &QueueStatus) -> String {
    match status.current.as_ref() {
        None if status.pending == 0 => "Queue is empty, nothing is running.".to_string(),
        None => format!("{} request(s) waiting, nothing running yet.", status.pending),
        Some(current) => format!(
            "Running: {} for {:.2}s\nWaiting: {}",
            current.name, current.elapsed_secs, status.pending
        ),
    }
}

pub fn model_loading(model: &str, kind: &str) -> String {
    format!("🔄 Loading model: {model} (type: {kind})")
}

pub fn image_caption(settings_json: &str) -> String {
    format!("🎉 Here is your image!\n\n📄 Settings:\n{settings_json}")
}

pub fn parameter_set(param: Parameter, value: &str) -> String {
    format!("{} set to {}.", param.label(), value)
}

pub fn missing_value(param: Parameter) -> String {
    format!("Please provide a value for {}.", param.label())
}

pub fn invalid_value(error: &dyn std::error::Error) -> String {
    format!("Invalid value: {error}")
}

pub fn job_error(error: &dyn std::error::Error) -> String {
    format!("An error occurred: {error}")
}

pub fn unknown_command(command: &str) -> String {
    format!("Unknown command {command}. Send /help for the list of commands.")
}

pub fn resource_list(kind: ResourceKind, items: &[String]) -> String {
    if items.is_empty() {
        return format!("No {} found.", kind.as_str());
    }
    let mut text = format!("Available {}:\n", kind.as_str());
    for item in items {
        text.push_str("• ");
        text.push_str(item);
        text.push('\n');
    }
    text.pop();
    text
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use bot_core::{ExecutionSnapshot, JobId, JobName};
    use chrono::Utc;

    use super::*;

    fn running(pending: usize) -> QueueStatus {
        QueueStatus {
            pending,
            current: Some(ExecutionSnapshot {
                id: JobId::new(),
                name: JobName::new("generate_image"),
                started_at: Utc::now(),
                elapsed_secs: 2.5,
            }),
        }
    }

    #[test]
    fn queue_position_names_the_running_job() {
        assert_eq!(
            queue_position(&running(2)),
            "🔄 Your request is in the queue.\nPosition: 2\nCurrent job: generate_image\nRunning for: 2.50s"
        );
    }

    #[test]
    fn queue_status_when_idle() {
        let idle = QueueStatus {
            pending: 0,
            current: None,
        };
        assert_eq!(queue_status(&idle), "Queue is empty, nothing is running.");
        assert!(queue_status(&running(1)).starts_with("Running: generate_image"));
    }

    #[test]
    fn panel_lists_every_parameter() {
        let panel = settings_panel(&GenerationSettings::default(), false);
        assert!(panel.contains("Steps: 24"));
        assert!(panel.contains("LoRA: None"));
        assert!(!panel.contains("/last"));
        assert!(settings_panel(&GenerationSettings::default(), true).contains("/last"));
    }

    #[test]
    fn resource_lists() {
        assert_eq!(resource_list(ResourceKind::Vaes, &[]), "No VAEs found.");
        assert_eq!(
            resource_list(ResourceKind::Models, &["a.ckpt".to_string()]),
            "Available models:\n• a.ckpt"
        );
    }
}
