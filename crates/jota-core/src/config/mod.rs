use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::Category;
use crate::constants::{defaults, endpoints, models};
use crate::context::{ChatMode, SystemPromptBuilder};
use crate::error::{JotaError, Result};
use crate::llm::{LlmClient, OpenAIClient, UsageLedger};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub sql: SqlSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key_env: String,
    pub base_url: Option<String>,
    /// Model for replies and classification.
    pub chat_model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub name: String,
    pub language: String,
    pub chat_mode: ChatMode,
    /// Named in the prompt together with the operator email, when one is set.
    pub creator: Option<String>,
    pub information: Vec<String>,
    pub max_history_messages: usize,
    pub max_history_characters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierSettings {
    pub enabled: bool,
    /// Defaults to `llm.chat_model`.
    pub model: Option<String>,
    /// Category answered by the SQL hinter.
    pub sql_category: String,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SqlSettings {
    /// SQLite database file, opened read-only. No SQL hints without it.
    pub database: Option<PathBuf>,
    /// Schema description file. Falls back to the `SCHEMA` variable.
    pub schema_file: Option<PathBuf>,
    pub limit_results: usize,
    pub steps: Vec<StepSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSettings {
    pub model: String,
    pub n: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key_env: endpoints::OPENAI_API_KEY_ENV.to_string(),
            base_url: None,
            chat_model: models::DEFAULT_CHAT_MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: defaults::ASSISTANT_NAME.to_string(),
            language: defaults::LANGUAGE.to_string(),
            chat_mode: ChatMode::OneToOne,
            creator: Some("Iago".to_string()),
            information: vec![
                "Your source code is available at https://github.com/iagocq/jota".to_string(),
                "You have access to information related to the courses database.".to_string(),
                "You only provide factual information".to_string(),
            ],
            max_history_messages: defaults::MAX_HISTORY_MESSAGES,
            max_history_characters: defaults::MAX_HISTORY_CHARACTERS,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            sql_category: "courses".to_string(),
            categories: vec![
                Category::new(
                    "courses",
                    "Questions related to the courses database. This database contains information \
                     about the current courses, classes, classrooms, teachers.",
                ),
                Category::new(
                    "university",
                    "Questions related to the university that are not related to the courses \
                     database. This category encompasses historical university data, university \
                     regulations, high level description of courses.",
                ),
                Category::new(
                    "general",
                    "General conversation questions that do not fall under other categories.",
                ),
            ],
        }
    }
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            database: None,
            schema_file: None,
            limit_results: defaults::LIMIT_RESULTS,
            steps: vec![
                StepSettings {
                    model: models::DEFAULT_SQL_MODEL.to_string(),
                    n: 3,
                },
                StepSettings {
                    model: models::DEFAULT_SQL_MODEL.to_string(),
                    n: 1,
                },
            ],
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jota")
            .join("config.toml")
    }

    /// Load from the default location, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from(&config_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", config_path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| JotaError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| JotaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the API key from the environment variable specified in settings.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env).ok()
    }

    pub fn operator_email(&self) -> Option<String> {
        std::env::var(defaults::EMAIL_ENV).ok()
    }

    /// Schema text from `sql.schema_file`, or the `SCHEMA` variable.
    pub fn schema_text(&self) -> Result<String> {
        if let Some(path) = &self.sql.schema_file {
            return Ok(std::fs::read_to_string(path)?);
        }
        std::env::var(defaults::SCHEMA_ENV).map_err(|_| {
            JotaError::Config(format!(
                "no schema configured: set sql.schema_file or {}",
                defaults::SCHEMA_ENV
            ))
        })
    }

    pub fn prompt_builder(&self) -> SystemPromptBuilder {
        let mut information = Vec::new();
        if let (Some(creator), Some(email)) = (&self.agent.creator, self.operator_email()) {
            information.push(format!(
                "The name of your creator is {creator}. Their email is {email}"
            ));
        }
        information.extend(self.agent.information.iter().cloned());

        SystemPromptBuilder::new()
            .with_name(&self.agent.name)
            .with_language(&self.agent.language)
            .with_chat_mode(self.agent.chat_mode)
            .with_information(information)
    }

    pub fn classifier_model(&self) -> &str {
        self.classifier
            .model
            .as_deref()
            .unwrap_or(&self.llm.chat_model)
    }

    /// Build a client for `model` that records usage into `ledger`.
    pub fn build_llm_client(&self, model: &str, ledger: UsageLedger) -> Result<Arc<dyn LlmClient>> {
        let api_key = self.api_key().ok_or_else(|| {
            JotaError::Config(format!("{} is not set", self.llm.api_key_env))
        })?;

        let mut client = OpenAIClient::new(api_key, ledger)
            .with_model(model)
            .with_temperature(self.llm.temperature);
        if let Some(url) = &self.llm.base_url {
            client = client.with_base_url(url);
        }
        Ok(Arc::new(client))
    }
}
