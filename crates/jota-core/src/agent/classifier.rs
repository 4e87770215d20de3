use crate::constants::defaults;
use crate::error::Result;
use crate::llm::{LlmClient, Message};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PROMPT_HEADER: &str = "Classify messages into one of the following categories:\n";
const PRIMER: &str = "Category:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Picks a topic for a user message with a single short completion.
pub struct ClassificationAgent {
    categories: Vec<Category>,
    model: Arc<dyn LlmClient>,
}

impl ClassificationAgent {
    pub fn new(model: Arc<dyn LlmClient>, categories: Vec<Category>) -> Self {
        Self { categories, model }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn prompt(&self) -> String {
        let mut prompt = PROMPT_HEADER.to_string();
        for category in &self.categories {
            prompt.push_str(&format!("- {}: {}\n", category.name, category.description));
        }
        prompt
    }

    /// Returns the first category, in configuration order, whose name occurs
    /// in the model's reply. Unrecognized replies give `None`.
    pub async fn classify(&self, utterance: &str) -> Result<Option<String>> {
        let messages = vec![
            Message::system(self.prompt()),
            Message::user(utterance),
            Message::assistant(PRIMER),
        ];

        let reply = self
            .model
            .generate(&messages, &[], Some(defaults::CLASSIFIER_MAX_TOKENS))
            .await?;

        let category = self
            .categories
            .iter()
            .find(|c| reply.contains(c.name.as_str()))
            .map(|c| c.name.clone());

        match &category {
            Some(name) => tracing::debug!("Classified as '{}'", name),
            None => tracing::debug!("Unrecognized classification reply: {:?}", reply),
        }
        Ok(category)
    }
}
