use crate::agent::Hinter;
use crate::constants::{defaults, sql};
use crate::context::{ChatMessage, HintMessage, HistoryView};
use crate::error::Result;
use crate::llm::{LlmClient, Message};
use crate::sql::executor::{SqlExecutor, SqlOutcome, SqlResult};
use crate::sql::{parse, prompt};
use std::sync::Arc;

/// One generate → filter → execute → score round.
#[derive(Clone)]
pub struct EnhancementStep {
    pub model: Arc<dyn LlmClient>,
    /// Completions requested in the round's single provider call.
    pub n: usize,
}

impl EnhancementStep {
    pub fn new(model: Arc<dyn LlmClient>, n: usize) -> Self {
        Self { model, n }
    }
}

/// Turns a question into a vetted query result, refining it over several
/// rounds. Each round after the first sees the previous query and its error.
pub struct SqlHinter {
    executor: Arc<dyn SqlExecutor>,
    steps: Vec<EnhancementStep>,
    generate_prompt: String,
    enhance_prompt: String,
    limit_results: usize,
}

impl SqlHinter {
    pub fn new(executor: Arc<dyn SqlExecutor>, steps: Vec<EnhancementStep>) -> Self {
        Self {
            executor,
            steps,
            generate_prompt: prompt::generate_template(),
            enhance_prompt: prompt::enhance_template(),
            limit_results: defaults::LIMIT_RESULTS,
        }
    }

    pub fn with_limit_results(mut self, limit: usize) -> Self {
        self.limit_results = limit;
        self
    }

    pub fn with_generate_prompt(mut self, template: impl Into<String>) -> Self {
        self.generate_prompt = template.into();
        self
    }

    pub fn with_enhance_prompt(mut self, template: impl Into<String>) -> Self {
        self.enhance_prompt = template.into();
        self
    }

    pub fn steps(&self) -> &[EnhancementStep] {
        &self.steps
    }

    /// Messages for one round. `last_result` switches to the enhance template
    /// and adds the previous query and its error.
    pub fn prepare_messages(
        &self,
        message: &ChatMessage,
        context: &HistoryView<'_>,
        last_result: Option<&SqlResult>,
    ) -> Vec<Message> {
        let template = match last_result {
            None => &self.generate_prompt,
            Some(_) => &self.enhance_prompt,
        };
        let engine = self.executor.engine();

        let mut messages = vec![
            Message::system(prompt::render(template, engine)),
            Message::system(self.executor.schema()).with_name(sql::SCHEMA_MESSAGE_NAME),
        ];

        if let Some(last) = last_result {
            messages.push(Message::system(&last.query).with_name(sql::QUERY_MESSAGE_NAME));
            let error = last.error_text().unwrap_or(sql::NO_ERROR_MARKER);
            messages.push(Message::system(error).with_name(sql::ERROR_MESSAGE_NAME));
        }

        messages.extend(context.to_messages());
        messages.push(Message::user(message.content.trim()));
        messages
    }

    async fn generate_queries(
        &self,
        step: &EnhancementStep,
        message: &ChatMessage,
        context: &HistoryView<'_>,
        last_result: Option<&SqlResult>,
    ) -> Result<Vec<String>> {
        let messages = self.prepare_messages(message, context, last_result);
        let completions = step
            .model
            .generate_multiple(&messages, &[], step.n, None)
            .await?;

        let queries: Vec<String> = completions
            .iter()
            .filter_map(|completion| parse::parse_candidate(completion))
            .collect();
        tracing::debug!(
            "{} of {} completions carried a query",
            queries.len(),
            completions.len()
        );
        Ok(queries)
    }

    /// Run one round and return its pick, if any.
    async fn enhance_step(
        &self,
        step: &EnhancementStep,
        message: &ChatMessage,
        context: &HistoryView<'_>,
        last_result: Option<&SqlResult>,
    ) -> Result<Option<SqlResult>> {
        let queries = self
            .generate_queries(step, message, context, last_result)
            .await?;

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            if !parse::is_safe_query(&query) {
                tracing::debug!("Discarding restricted query: {}", query);
                continue;
            }
            results.push(self.executor.execute(&query).await);
        }

        Ok(select_result(results))
    }

    /// Run every configured round and return the final result.
    pub async fn generate_enhanced_query(
        &self,
        message: &ChatMessage,
        context: &HistoryView<'_>,
    ) -> Result<Option<SqlResult>> {
        let mut last_result: Option<SqlResult> = None;

        for (round, step) in self.steps.iter().enumerate() {
            let picked = self
                .enhance_step(step, message, context, last_result.as_ref())
                .await?;

            match picked {
                None => {
                    tracing::info!("SQL round {} produced no usable candidate", round + 1);
                }
                Some(result) if result.is_error() && last_result.is_some() => {
                    tracing::info!(
                        "SQL round {} only produced errors, keeping the previous result",
                        round + 1
                    );
                }
                Some(result) => {
                    tracing::info!(
                        "SQL round {} picked a query with {} rows{}",
                        round + 1,
                        result.row_count(),
                        if result.is_error() { " (error)" } else { "" }
                    );
                    last_result = Some(result);
                }
            }
        }

        Ok(last_result)
    }

    pub fn render_hint(&self, result: Option<&SqlResult>) -> HintMessage {
        HintMessage::new(render_result(result, self.limit_results))
    }
}

/// Pick the successful result with the fewest rows, first generated on ties.
/// When every result is an error the first error is returned.
pub fn select_result(mut results: Vec<SqlResult>) -> Option<SqlResult> {
    // TODO: fewest rows ranks an empty result above a populated one; compare
    // against preferring the smallest non-empty result once real transcripts exist.
    results.sort_by_key(|r| (r.is_error(), r.row_count()));
    results.into_iter().next()
}

/// Hint text for a pipeline outcome.
pub fn render_result(result: Option<&SqlResult>, limit: usize) -> String {
    let Some(result) = result else {
        return sql::NO_QUERY_TEXT.to_string();
    };

    match result.outcome {
        SqlOutcome::Error(_) => sql::QUERY_ERROR_TEXT.to_string(),
        SqlOutcome::Rows {
            ref column_names,
            ref rows,
        } => {
            let columns = column_names.join("\t");
            let shown = rows
                .iter()
                .take(limit)
                .map(|row| row.join("\t"))
                .collect::<Vec<_>>()
                .join("\n");

            let mut text = format!(
                "The user query returned the following results:\n\n\
                 Column names: {columns}\n\
                 Rows:\n{shown}"
            );

            let omitted = rows.len().saturating_sub(limit);
            if omitted > 0 {
                text.push_str(&format!(
                    "\n...\n{omitted} rows omitted. Inform the user that {omitted} results were omitted."
                ));
            }
            text
        }
    }
}

#[async_trait::async_trait]
impl Hinter for SqlHinter {
    async fn hint(&self, message: &ChatMessage, context: &HistoryView<'_>) -> Result<HintMessage> {
        let result = self.generate_enhanced_query(message, context).await?;
        Ok(self.render_hint(result.as_ref()))
    }
}
