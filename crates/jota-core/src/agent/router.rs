use crate::context::{ChatMessage, HintMessage, HistoryView};
use crate::error::Result;
use std::collections::HashMap;

/// Produces background information for a user message before the reply is
/// generated.
#[async_trait::async_trait]
pub trait Hinter: Send + Sync {
    async fn hint(&self, message: &ChatMessage, context: &HistoryView<'_>) -> Result<HintMessage>;
}

/// Maps classifier categories to the hinter that serves them.
pub struct HintRouter {
    hinters: HashMap<String, Box<dyn Hinter>>,
}

impl HintRouter {
    pub fn new() -> Self {
        Self {
            hinters: HashMap::new(),
        }
    }

    pub fn register(&mut self, category: impl Into<String>, hinter: Box<dyn Hinter>) {
        self.hinters.insert(category.into(), hinter);
    }

    pub fn with_hinter(mut self, category: impl Into<String>, hinter: Box<dyn Hinter>) -> Self {
        self.register(category, hinter);
        self
    }

    pub fn get(&self, category: &str) -> Option<&dyn Hinter> {
        self.hinters.get(category).map(|h| h.as_ref())
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hinters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the hinter registered for `category`. `Ok(None)` when there is none.
    pub async fn hint(
        &self,
        category: &str,
        message: &ChatMessage,
        context: &HistoryView<'_>,
    ) -> Result<Option<HintMessage>> {
        let Some(hinter) = self.get(category) else {
            tracing::debug!("No hinter registered for category '{}'", category);
            return Ok(None);
        };
        hinter.hint(message, context).await.map(Some)
    }
}

impl Default for HintRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl Hinter for Echo {
        async fn hint(&self, message: &ChatMessage, _context: &HistoryView<'_>) -> Result<HintMessage> {
            Ok(HintMessage::new(format!("echo: {}", message.content)))
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_hinter() {
        let router = HintRouter::new().with_hinter("courses", Box::new(Echo));
        let message = ChatMessage::user("Ana", "oi");

        let hint = router
            .hint("courses", &message, &HistoryView::empty())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hint.content, "echo: oi");
    }

    #[tokio::test]
    async fn test_unknown_category_is_none() {
        let router = HintRouter::new().with_hinter("courses", Box::new(Echo));
        let message = ChatMessage::user("Ana", "oi");

        let hint = router
            .hint("weather", &message, &HistoryView::empty())
            .await
            .unwrap();
        assert!(hint.is_none());
        assert_eq!(router.categories(), vec!["courses"]);
        assert!(router.get("weather").is_none());
    }
}
