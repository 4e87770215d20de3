use crate::constants::defaults;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPLATE: &str = "{chat_type} \
Your name is {name}. \
You're relaxed, friendly and helpful. \
You have access to the last few messages in the chat. \
Your main language is {language}. \
Use search results to enhance your answers. \
Only provide answers about courses, professors, and other academic information based on the search results.\
\n\nMiscellaneous information:\n{information}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Group,
    #[default]
    OneToOne,
}

impl ChatMode {
    pub fn phrase(&self) -> &'static str {
        match self {
            Self::Group => "You're a member of a group chat.",
            Self::OneToOne => "You're chatting with someone.",
        }
    }
}

/// Builds the assistant's system prompt from a template with `{chat_type}`,
/// `{name}`, `{language}` and `{information}` placeholders.
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    template: String,
    chat_mode: ChatMode,
    name: String,
    language: String,
    information: Vec<String>,
}

impl SystemPromptBuilder {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            chat_mode: ChatMode::default(),
            name: defaults::ASSISTANT_NAME.to_string(),
            language: defaults::LANGUAGE.to_string(),
            information: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_chat_mode(mut self, mode: ChatMode) -> Self {
        self.chat_mode = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_information(mut self, information: Vec<String>) -> Self {
        self.information = information;
        self
    }

    pub fn add_information(mut self, fact: impl Into<String>) -> Self {
        self.information.push(fact.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> String {
        let information = self
            .information
            .iter()
            .map(|fact| format!("- {fact}"))
            .collect::<Vec<_>>()
            .join("\n");

        self.template
            .replace("{chat_type}", self.chat_mode.phrase())
            .replace("{name}", &self.name)
            .replace("{language}", &self.language)
            .replace("{information}", &information)
    }
}

impl Default for SystemPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt() {
        let prompt = SystemPromptBuilder::new()
            .add_information("Your source code is public")
            .add_information("You only provide factual information")
            .build();

        assert!(prompt.starts_with("You're chatting with someone. Your name is Jota."));
        assert!(prompt.contains("Your main language is portuguese."));
        assert!(prompt.ends_with(
            "Miscellaneous information:\n- Your source code is public\n- You only provide factual information"
        ));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_group_mode_and_language() {
        let prompt = SystemPromptBuilder::new()
            .with_chat_mode(ChatMode::Group)
            .with_name("Zé")
            .with_language("english")
            .build();

        assert!(prompt.starts_with("You're a member of a group chat. Your name is Zé."));
        assert!(prompt.contains("Your main language is english."));
    }

    #[test]
    fn test_custom_template() {
        let prompt = SystemPromptBuilder::new()
            .with_template("{name}/{language}/{chat_type}")
            .build();
        assert_eq!(prompt, "Jota/portuguese/You're chatting with someone.");
    }
}
