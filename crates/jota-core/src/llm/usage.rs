use crate::error::{JotaError, Result};
use crate::llm::traits::Message;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::AddAssign;
use std::sync::{Arc, Mutex, MutexGuard};
use tiktoken_rs::CoreBPE;

/// Token counts for one or more requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelUsage {
    pub model: String,
    pub usage: Usage,
}

/// USD per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

impl Pricing {
    pub fn cost(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.input
            + (usage.completion_tokens as f64 / 1000.0) * self.output
    }
}

pub const GPT_3_5_TURBO_4K_PRICING: Pricing = Pricing { input: 0.0015, output: 0.002 };
pub const GPT_3_5_TURBO_16K_PRICING: Pricing = Pricing { input: 0.003, output: 0.004 };
pub const GPT_4_8K_PRICING: Pricing = Pricing { input: 0.03, output: 0.06 };
pub const GPT_4_32K_PRICING: Pricing = Pricing { input: 0.06, output: 0.12 };

pub fn default_pricing() -> HashMap<String, Pricing> {
    HashMap::from([
        ("gpt-3.5-turbo".to_string(), GPT_3_5_TURBO_4K_PRICING),
        ("gpt-3.5-turbo-16k".to_string(), GPT_3_5_TURBO_16K_PRICING),
        ("gpt-4".to_string(), GPT_4_8K_PRICING),
        ("gpt-4-32k".to_string(), GPT_4_32K_PRICING),
    ])
}

#[derive(Debug)]
struct LedgerState {
    records: Vec<ModelUsage>,
    pricing: HashMap<String, Pricing>,
}

/// Session-wide record of token usage, keyed by model id.
///
/// Cloning the ledger yields another handle to the same records, so one ledger
/// can be handed to every client of a session.
#[derive(Debug, Clone)]
pub struct UsageLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::with_pricing(default_pricing())
    }

    pub fn with_pricing(pricing: HashMap<String, Pricing>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerState {
                records: Vec::new(),
                pricing,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, model: impl Into<String>, usage: Usage) {
        let model = model.into();
        tracing::debug!(
            "Recording usage for {}: {} prompt + {} completion tokens",
            model,
            usage.prompt_tokens,
            usage.completion_tokens
        );
        self.state().records.push(ModelUsage { model, usage });
    }

    pub fn records(&self) -> Vec<ModelUsage> {
        self.state().records.clone()
    }

    /// Cumulative usage per model.
    pub fn totals(&self) -> BTreeMap<String, Usage> {
        let mut totals: BTreeMap<String, Usage> = BTreeMap::new();
        for record in self.state().records.iter() {
            *totals.entry(record.model.clone()).or_default() += record.usage;
        }
        totals
    }

    pub fn usage_for(&self, model: &str) -> Usage {
        self.totals().remove(model).unwrap_or_default()
    }

    /// Estimated cost of one model's usage, `None` when the model has no price.
    pub fn cost_for(&self, model: &str) -> Option<f64> {
        let pricing = self.state().pricing.get(model).copied()?;
        Some(pricing.cost(&self.usage_for(model)))
    }

    /// Estimated cost across all models with a known price.
    pub fn estimated_cost(&self) -> f64 {
        self.totals()
            .iter()
            .map(|(model, usage)| match self.state().pricing.get(model) {
                Some(pricing) => pricing.cost(usage),
                None => {
                    tracing::warn!("No pricing for model {}, cost not estimated", model);
                    0.0
                }
            })
            .sum()
    }
}

/// Fixed per-message token overheads of the chat format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenOverhead {
    pub per_message: i64,
    pub per_name: i64,
}

const TOKEN_OVERHEADS: &[(&str, TokenOverhead)] = &[
    ("gpt-3.5-turbo-0301", TokenOverhead { per_message: 4, per_name: -1 }),
    ("gpt-3.5-turbo", TokenOverhead { per_message: 3, per_name: 1 }),
    ("gpt-4", TokenOverhead { per_message: 3, per_name: 1 }),
];

/// Overheads for the first family whose key occurs in `model`; unknown
/// families use the gpt-4 numbers.
pub fn token_overhead(model: &str) -> TokenOverhead {
    TOKEN_OVERHEADS
        .iter()
        .find(|(family, _)| model.contains(family))
        .or_else(|| TOKEN_OVERHEADS.iter().find(|(family, _)| *family == "gpt-4"))
        .map(|(_, overhead)| *overhead)
        .unwrap_or(TokenOverhead { per_message: 3, per_name: 1 })
}

/// Counts tokens locally for responses that don't report usage (streams).
pub struct TokenCounter {
    bpe: CoreBPE,
    overhead: TokenOverhead,
}

impl TokenCounter {
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::warn!("No tokenizer known for {}, using cl100k_base", model);
                tiktoken_rs::cl100k_base()
                    .map_err(|e| JotaError::Other(format!("Failed to load tokenizer: {e}")))?
            }
        };
        Ok(Self {
            bpe,
            overhead: token_overhead(model),
        })
    }

    pub fn count(&self, text: &str) -> u64 {
        self.bpe.encode_ordinary(text).len() as u64
    }

    pub fn prompt_tokens(&self, messages: &[Message]) -> u64 {
        let total: i64 = messages
            .iter()
            .map(|m| {
                let mut tokens = self.overhead.per_message
                    + self.count(m.role.as_str()) as i64
                    + self.count(&m.content) as i64;
                if let Some(ref name) = m.name {
                    tokens += self.count(name) as i64 + self.overhead.per_name;
                }
                tokens
            })
            .sum();
        total.max(0) as u64
    }

    pub fn completion_tokens<'a>(&self, choices: impl IntoIterator<Item = &'a str>) -> u64 {
        choices.into_iter().map(|text| self.count(text)).sum()
    }

    pub fn usage(&self, messages: &[Message], choices: &[String]) -> Usage {
        Usage::new(
            self.prompt_tokens(messages),
            self.completion_tokens(choices.iter().map(String::as_str)),
        )
    }
}
