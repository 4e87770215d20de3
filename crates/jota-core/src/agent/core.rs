use crate::agent::{ClassificationAgent, HintRouter};
use crate::constants::defaults;
use crate::context::{ChatMessage, HintMessage, History, HistoryEntry, HistoryView, MessageId, SystemPromptBuilder};
use crate::error::{JotaError, Result};
use crate::llm::{LlmClient, Message, StreamEvent};
use futures::StreamExt;
use std::sync::Arc;

/// Events emitted while a reply is produced - the shared CLI/bot interface.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Classified { category: Option<String> },
    Hint(String),
    TextDelta(String),
    Complete { message_id: MessageId },
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub message_id: MessageId,
    pub content: String,
    pub category: Option<String>,
    pub hint: Option<String>,
}

/// Holds one conversation and answers its messages, optionally grounding
/// each reply in a hint chosen by the classifier.
pub struct ConversationalAgent {
    llm: Arc<dyn LlmClient>,
    history: History,
    prompt: SystemPromptBuilder,
    classifier: Option<ClassificationAgent>,
    router: Option<HintRouter>,
    max_history_messages: usize,
    max_history_characters: usize,
}

impl ConversationalAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            history: History::new(),
            prompt: SystemPromptBuilder::new(),
            classifier: None,
            router: None,
            max_history_messages: defaults::MAX_HISTORY_MESSAGES,
            max_history_characters: defaults::MAX_HISTORY_CHARACTERS,
        }
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    pub fn with_prompt(mut self, prompt: SystemPromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassificationAgent) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_router(mut self, router: HintRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_max_history_messages(mut self, max: usize) -> Self {
        self.max_history_messages = max;
        self
    }

    pub fn with_max_history_characters(mut self, max: usize) -> Self {
        self.max_history_characters = max;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Answer `message`, returning the final reply.
    pub async fn reply(&mut self, message: ChatMessage) -> Result<AgentReply> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        self.reply_with_events(message, tx).await
    }

    /// Answer `message`, emitting [`AgentEvent`]s through the channel.
    ///
    /// The message, any hint and the reply are recorded in the history. On a
    /// stream error the reserved reply is left empty.
    pub async fn reply_with_events(
        &mut self,
        message: ChatMessage,
        event_tx: tokio::sync::mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<AgentReply> {
        // The window is taken before the new message is recorded.
        let (history_messages, category, hint) = {
            let view = self
                .history
                .last_n_messages(self.max_history_messages)
                .limit_characters(self.max_history_characters);
            let (category, hint) = self
                .find_hint(&message, &view, &event_tx)
                .await
                .inspect_err(|e| {
                    let _ = event_tx.send(AgentEvent::Error(e.to_string()));
                })?;
            (view.to_messages(), category, hint)
        };

        let mut messages = Vec::with_capacity(history_messages.len() + 4);
        messages.push(Message::system(self.prompt.build()));
        messages.extend(history_messages);

        let user_id = self.history.add_message(message);
        messages.extend(self.history.get(user_id).map(HistoryEntry::to_model_message));

        let hint_text = hint.as_ref().map(|h| h.content.clone());
        if let Some(hint) = hint {
            messages.push(hint.to_model_message());
            self.history.add_message(hint);
        }

        let pending = self
            .history
            .reserve_reply(ChatMessage::assistant(self.prompt.name(), "").replying_to(user_id));
        messages.push(pending.primed_message().clone());

        tracing::debug!("Sending {} messages to {}", messages.len(), self.llm.model());

        let mut stream = self
            .llm
            .generate_stream(&messages, &[defaults::STOP_SEQUENCE], None)
            .await
            .inspect_err(|e| {
                let _ = event_tx.send(AgentEvent::Error(e.to_string()));
            })?;

        let mut content = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    content.push_str(&delta);
                    let _ = event_tx.send(AgentEvent::TextDelta(delta));
                }
                StreamEvent::Done => break,
                StreamEvent::Error(err) => {
                    let _ = event_tx.send(AgentEvent::Error(err.clone()));
                    return Err(JotaError::Llm(err));
                }
            }
        }

        let message_id = self.history.commit_reply(pending, content.clone())?;
        let _ = event_tx.send(AgentEvent::Complete { message_id });
        tracing::info!("Reply #{} complete ({} chars)", message_id, content.chars().count());

        Ok(AgentReply {
            message_id,
            content,
            category,
            hint: hint_text,
        })
    }

    async fn find_hint(
        &self,
        message: &ChatMessage,
        view: &HistoryView<'_>,
        event_tx: &tokio::sync::mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<(Option<String>, Option<HintMessage>)> {
        let (Some(classifier), Some(router)) = (&self.classifier, &self.router) else {
            return Ok((None, None));
        };

        let category = classifier.classify(&message.content).await?;
        let _ = event_tx.send(AgentEvent::Classified {
            category: category.clone(),
        });

        let hint = match &category {
            Some(name) => router.hint(name, message, view).await?,
            None => None,
        };
        if let Some(hint) = &hint {
            let _ = event_tx.send(AgentEvent::Hint(hint.content.clone()));
        }

        Ok((category, hint))
    }
}
