use anyhow::{Context, Result};
use jota_core::{
    AgentEvent, AgentReply, ChatMessage, ClassificationAgent, ConversationalAgent, EnhancementStep,
    HintRouter, Settings, SqlHinter, SqliteExecutor, UsageLedger,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::{self, CommandResult};

/// Wire the agent from settings. SQL hints are only enabled when a database
/// is configured.
pub fn build_agent(settings: &Settings, ledger: &UsageLedger) -> Result<ConversationalAgent> {
    let chat_llm = settings.build_llm_client(&settings.llm.chat_model, ledger.clone())?;

    let mut agent = ConversationalAgent::new(chat_llm)
        .with_prompt(settings.prompt_builder())
        .with_max_history_messages(settings.agent.max_history_messages)
        .with_max_history_characters(settings.agent.max_history_characters);

    if !settings.classifier.enabled {
        return Ok(agent);
    }
    let Some(database) = &settings.sql.database else {
        tracing::warn!("No sql.database configured, replies will not use search results");
        return Ok(agent);
    };

    let schema = settings.schema_text()?;
    let executor = SqliteExecutor::open_read_only(database, schema)
        .with_context(|| format!("Failed to open {}", database.display()))?;

    let steps = settings
        .sql
        .steps
        .iter()
        .map(|step| -> Result<EnhancementStep> {
            let model = settings.build_llm_client(&step.model, ledger.clone())?;
            Ok(EnhancementStep::new(model, step.n))
        })
        .collect::<Result<Vec<_>>>()?;

    let hinter = SqlHinter::new(Arc::new(executor), steps)
        .with_limit_results(settings.sql.limit_results);
    let router = HintRouter::new().with_hinter(&settings.classifier.sql_category, Box::new(hinter));

    let classifier_llm = settings.build_llm_client(settings.classifier_model(), ledger.clone())?;
    let classifier = ClassificationAgent::new(classifier_llm, settings.classifier.categories.clone());

    agent = agent.with_classifier(classifier).with_router(router);
    Ok(agent)
}

// ── Single-prompt mode ──────────────────────────────────────────────────

pub async fn run_single_prompt(settings: &Settings, sender: &str, prompt: &str) -> Result<()> {
    let ledger = UsageLedger::new();
    let agent = build_agent(settings, &ledger)?;

    let (_, result) = stream_reply(agent, ChatMessage::user(sender, prompt)).await?;
    result?;
    print_usage(&ledger);
    Ok(())
}

// ── Chat loop ───────────────────────────────────────────────────────────

pub async fn run_chat(settings: &Settings, sender: Option<String>) -> Result<()> {
    let ledger = UsageLedger::new();
    let mut agent = build_agent(settings, &ledger)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let sender = match sender {
        Some(name) => name,
        None => {
            prompt("Your name: ")?;
            lines.next_line().await?.unwrap_or_default().trim().to_string()
        }
    };

    loop {
        prompt("You: ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match commands::handle_command(&line) {
            CommandResult::Quit => break,
            CommandResult::ShowHistory => print!("{}", agent.history()),
            CommandResult::ShowUsage => print_usage(&ledger),
            CommandResult::Message(text) => println!("{text}"),
            CommandResult::NotACommand => {
                let (returned, result) = stream_reply(agent, ChatMessage::user(&sender, line)).await?;
                agent = returned;
                if let Err(e) = result {
                    tracing::debug!("Turn failed: {e}");
                }
            }
        }
    }

    print_usage(&ledger);
    Ok(())
}

/// Run one turn on a task, printing events as they arrive. The agent is
/// handed back together with the turn's outcome.
async fn stream_reply(
    mut agent: ConversationalAgent,
    message: ChatMessage,
) -> Result<(ConversationalAgent, jota_core::Result<AgentReply>)> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AgentEvent>();

    let agent_handle = tokio::spawn(async move {
        let result = agent.reply_with_events(message, event_tx).await;
        (agent, result)
    });

    let mut started = false;
    while let Some(event) = event_rx.recv().await {
        match event {
            AgentEvent::Classified {
                category: Some(category),
            } => eprintln!("[category: {category}]"),
            AgentEvent::Classified { category: None } => eprintln!("[category: none]"),
            AgentEvent::Hint(hint) => tracing::info!("Search result:\n{hint}"),
            AgentEvent::TextDelta(text) => {
                if !started {
                    print!("Bot: ");
                    started = true;
                }
                print!("{text}");
                std::io::stdout().flush()?;
            }
            AgentEvent::Complete { .. } => println!(),
            AgentEvent::Error(e) => eprintln!("\nError: {e}"),
        }
    }

    Ok(agent_handle.await?)
}

fn prompt(text: &str) -> Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}

fn print_usage(ledger: &UsageLedger) {
    let totals = ledger.totals();
    if totals.is_empty() {
        return;
    }
    eprintln!("\nToken usage:");
    for (model, usage) in &totals {
        eprintln!(
            "  {model}: {} prompt + {} completion = {} tokens",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }
    eprintln!("  Estimated cost: ${:.4}", ledger.estimated_cost());
}
