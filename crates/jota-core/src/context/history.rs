use crate::constants::{defaults, sql};
use crate::error::{JotaError, Result};
use crate::llm::{Message, Role};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Position of a message in its history. Ids are dense, starting at 0.
pub type MessageId = usize;

/// A chat line from a participant (user or assistant).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    id: Option<MessageId>,
    pub role: Role,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
    pub in_reply_to: Option<MessageId>,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            sender: sender.into(),
            sent_at: Utc::now(),
            in_reply_to: None,
            content: content.into(),
        }
    }

    pub fn user(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::User, sender, content)
    }

    pub fn assistant(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, sender, content)
    }

    pub fn replying_to(mut self, id: MessageId) -> Self {
        self.in_reply_to = Some(id);
        self
    }

    pub fn sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = sent_at;
        self
    }

    /// Assigned by [`History::add_message`]; `None` until recorded.
    pub fn id(&self) -> Option<MessageId> {
        self.id
    }

    /// Transcript prefix up to and including the opening quote.
    fn header(&self) -> String {
        let mut header = String::new();
        if let Some(id) = self.id {
            header.push_str(&format!("#{id} "));
        }
        header.push_str(&self.sender);
        if let Some(parent) = self.in_reply_to {
            header.push_str(&format!(" (reply to #{parent})"));
        }
        header.push_str(&format!(" [{}]: ", self.sent_at.format("%Y-%m-%d %H:%M")));
        header.push_str(defaults::STOP_SEQUENCE);
        header
    }

    pub fn to_model_message(&self) -> Message {
        Message {
            role: self.role,
            name: None,
            content: format!("{}{}{}", self.header(), self.content, defaults::STOP_SEQUENCE),
        }
    }

    /// An unterminated transcript line the model is expected to complete.
    pub fn to_primed_message(&self) -> Message {
        Message {
            role: self.role,
            name: None,
            content: self.header(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.id {
            write!(f, "#{id} ")?;
        }
        write!(f, "{}", self.sender)?;
        if let Some(parent) = self.in_reply_to {
            write!(f, " (reply to #{parent})")?;
        }
        write!(
            f,
            " [{}]: {}",
            self.sent_at.format("%Y-%m-%d %H:%M"),
            self.content
        )
    }
}

/// Grounding text injected ahead of the reply as a named system message.
#[derive(Debug, Clone, PartialEq)]
pub struct HintMessage {
    id: Option<MessageId>,
    pub name: String,
    pub content: String,
}

impl HintMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            name: sql::HINT_NAME.to_string(),
            content: content.into(),
        }
    }

    pub fn id(&self) -> Option<MessageId> {
        self.id
    }

    pub fn to_model_message(&self) -> Message {
        Message::system(&self.content).with_name(&self.name)
    }
}

impl fmt::Display for HintMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Chat(ChatMessage),
    Hint(HintMessage),
}

impl HistoryEntry {
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Self::Chat(m) => m.id,
            Self::Hint(m) => m.id,
        }
    }

    fn set_id(&mut self, id: MessageId) {
        match self {
            Self::Chat(m) => m.id = Some(id),
            Self::Hint(m) => m.id = Some(id),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Chat(m) => &m.content,
            Self::Hint(m) => &m.content,
        }
    }

    pub fn in_reply_to(&self) -> Option<MessageId> {
        match self {
            Self::Chat(m) => m.in_reply_to,
            Self::Hint(_) => None,
        }
    }

    pub fn to_model_message(&self) -> Message {
        match self {
            Self::Chat(m) => m.to_model_message(),
            Self::Hint(m) => m.to_model_message(),
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(m) => write!(f, "{m}"),
            Self::Hint(m) => write!(f, "{m}"),
        }
    }
}

impl From<ChatMessage> for HistoryEntry {
    fn from(message: ChatMessage) -> Self {
        Self::Chat(message)
    }
}

impl From<HintMessage> for HistoryEntry {
    fn from(message: HintMessage) -> Self {
        Self::Hint(message)
    }
}

/// A reply slot reserved in a [`History`] before its text exists.
///
/// Consumed by [`History::commit_reply`], so the final text is written once.
#[derive(Debug)]
#[must_use = "a reserved reply stays empty until committed"]
pub struct PendingReply {
    id: MessageId,
    primed: Message,
}

impl PendingReply {
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The reserved line as the model should see it, left open for completion.
    pub fn primed_message(&self) -> &Message {
        &self.primed
    }
}

/// Append-only log of one conversation.
///
/// Not internally synchronized: one turn at a time per history. Callers that
/// share a history across tasks must serialize access themselves.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message, assigning it the next id.
    pub fn add_message(&mut self, message: impl Into<HistoryEntry>) -> MessageId {
        let mut entry = message.into();
        let id = self.entries.len();
        entry.set_id(id);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: MessageId) -> Option<&HistoryEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The last `n` messages plus every ancestor they reply to, by id.
    pub fn last_n_messages(&self, n: usize) -> HistoryView<'_> {
        let start = self.entries.len().saturating_sub(n);
        let window = &self.entries[start..];

        let mut included: BTreeMap<MessageId, &HistoryEntry> = window
            .iter()
            .enumerate()
            .map(|(offset, entry)| (start + offset, entry))
            .collect();

        for entry in window {
            let mut parent = entry.in_reply_to();
            while let Some(id) = parent {
                if included.contains_key(&id) {
                    break;
                }
                let Some(ancestor) = self.entries.get(id) else {
                    break;
                };
                included.insert(id, ancestor);
                parent = ancestor.in_reply_to();
            }
        }

        HistoryView {
            entries: included.into_values().collect(),
        }
    }

    /// Record an empty reply and hand back its slot.
    pub fn reserve_reply(&mut self, message: ChatMessage) -> PendingReply {
        let id = self.add_message(ChatMessage {
            content: String::new(),
            ..message
        });
        let primed = match &self.entries[id] {
            HistoryEntry::Chat(m) => m.to_primed_message(),
            HistoryEntry::Hint(m) => m.to_model_message(),
        };
        PendingReply { id, primed }
    }

    /// Write the finished text into a reserved slot.
    pub fn commit_reply(&mut self, reply: PendingReply, content: impl Into<String>) -> Result<MessageId> {
        match self.entries.get_mut(reply.id) {
            Some(HistoryEntry::Chat(message)) => {
                message.content = content.into();
                Ok(reply.id)
            }
            Some(HistoryEntry::Hint(_)) => Err(JotaError::history(format!(
                "message #{} is not a chat message",
                reply.id
            ))),
            None => Err(JotaError::history(format!("no message #{}", reply.id))),
        }
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Read-only projection of a [`History`] used to build prompts.
#[derive(Debug, Clone, Default)]
pub struct HistoryView<'a> {
    entries: Vec<&'a HistoryEntry>,
}

impl<'a> HistoryView<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keep the newest messages whose combined content fits in `limit`
    /// characters. May keep nothing.
    pub fn limit_characters(mut self, limit: usize) -> Self {
        let mut total = 0;
        let mut keep = 0;
        for entry in self.entries.iter().rev() {
            let len = entry.content().chars().count();
            if total + len > limit {
                break;
            }
            total += len;
            keep += 1;
        }
        let drop = self.entries.len() - keep;
        self.entries.drain(..drop);
        self
    }

    pub fn entries(&self) -> &[&'a HistoryEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.iter().filter_map(|e| e.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn character_count(&self) -> usize {
        self.entries.iter().map(|e| e.content().chars().count()).sum()
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.to_model_message()).collect()
    }
}
