/// Jota: centralized constants.
/// Prompt literals, limits, and model names live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Model used for the conversational reply and the classifier.
    pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

    /// Model used for SQL candidate generation.
    pub const DEFAULT_SQL_MODEL: &str = "gpt-4";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
    pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const ASSISTANT_NAME: &str = "Jota";
    pub const LANGUAGE: &str = "portuguese";
    pub const TEMPERATURE: f32 = 0.3;
    pub const HTTP_TIMEOUT_SECS: u64 = 120;
    pub const MAX_HISTORY_MESSAGES: usize = 20;
    pub const MAX_HISTORY_CHARACTERS: usize = 2000;
    pub const LIMIT_RESULTS: usize = 10;

    /// Chat transcript lines are quoted with this marker, so it doubles as
    /// the stop sequence for the reply.
    pub const STOP_SEQUENCE: &str = "\"\"\"";

    /// The classifier only needs the first word of the answer.
    pub const CLASSIFIER_MAX_TOKENS: u32 = 2;

    pub const EMAIL_ENV: &str = "EMAIL";
    pub const SCHEMA_ENV: &str = "SCHEMA";
}

// ─── SQL Hint Pipeline ────────────────────────────────────────────────────────

pub mod sql {
    pub const ENGINE_SQLITE: &str = "sqlite";

    /// Keywords that disqualify a candidate query, matched as lowercase substrings.
    pub const RESTRICTED_KEYWORDS: &[&str] =
        &["delete", "update", "insert", "create", "alter", "drop", "pragma"];

    pub const QUERY_FIELD: &str = "SQLQuery";
    pub const SCHEMA_MESSAGE_NAME: &str = "database_schema";
    pub const QUERY_MESSAGE_NAME: &str = "query";
    pub const ERROR_MESSAGE_NAME: &str = "error";
    pub const NO_ERROR_MARKER: &str = "Query generated no errors.";

    pub const HINT_NAME: &str = "search_result";
    pub const NO_QUERY_TEXT: &str = "I could not generate a query for this prompt.";
    pub const QUERY_ERROR_TEXT: &str =
        "I encountered an error while fetching the information for the user.";
}
