use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use jota_core::constants::sql;
use jota_core::{
    Category, ChatMessage, ClassificationAgent, ConversationalAgent, EnhancementStep, HintRouter,
    Hinter, History, HistoryEntry, HistoryView, JotaError, LlmClient, Message, Role, SqlExecutor,
    SqlHinter, SqliteExecutor, StreamEvent,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "CREATE TABLE professores (id INTEGER PRIMARY KEY, nome TEXT NOT NULL);";

/// Mock LLM that returns one scripted batch of completions per call.
#[derive(Default)]
struct MockLlm {
    batches: Mutex<VecDeque<Vec<String>>>,
    streams: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<(Vec<Message>, usize)>>,
}

impl MockLlm {
    fn new(batches: Vec<Vec<&str>>) -> Arc<Self> {
        let mock = Self::default();
        *mock.batches.lock().unwrap() = batches
            .into_iter()
            .map(|b| b.into_iter().map(String::from).collect())
            .collect();
        Arc::new(mock)
    }

    fn streaming(events: Vec<StreamEvent>) -> Arc<Self> {
        let mock = Self::default();
        mock.streams.lock().unwrap().push_back(events);
        Arc::new(mock)
    }

    fn requests(&self) -> Vec<(Vec<Message>, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    fn model(&self) -> &str {
        "mock-sql"
    }

    async fn generate_multiple(
        &self,
        messages: &[Message],
        _stop: &[&str],
        n: usize,
        _max_tokens: Option<u32>,
    ) -> Result<Vec<String>, JotaError> {
        self.requests.lock().unwrap().push((messages.to_vec(), n));
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| JotaError::Llm("no scripted batch".into()))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        _stop: &[&str],
        _max_tokens: Option<u32>,
    ) -> Result<UnboundedReceiver<StreamEvent>, JotaError> {
        self.requests.lock().unwrap().push((messages.to_vec(), 1));
        let events = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![StreamEvent::Done]);
        let (tx, rx) = unbounded();
        for event in events {
            tx.unbounded_send(event).unwrap();
        }
        Ok(rx)
    }
}

fn database() -> Arc<SqliteExecutor> {
    let executor = SqliteExecutor::open_in_memory(SCHEMA).unwrap();
    executor
        .execute_batch(
            "CREATE TABLE professores (id INTEGER PRIMARY KEY, nome TEXT NOT NULL);
             INSERT INTO professores (id, nome) VALUES (1, 'Ana Souza');
             INSERT INTO professores (id, nome) VALUES (2, 'Bruno Lima');",
        )
        .unwrap();
    Arc::new(executor)
}

fn answer(query: &str) -> String {
    format!("ThinkStepByStep: read the professores table.\n\nSQLQuery: ```sql\n{query}\n```")
}

fn hinter(executor: Arc<SqliteExecutor>, steps: Vec<(Arc<MockLlm>, usize)>) -> SqlHinter {
    let steps = steps
        .into_iter()
        .map(|(model, n)| EnhancementStep::new(model, n))
        .collect();
    SqlHinter::new(executor, steps)
}

fn question() -> ChatMessage {
    ChatMessage::user("Ana", "quantos professores existem?")
}

#[tokio::test]
async fn test_hint_lists_rows_with_tab_separated_header() {
    let first = answer("SELECT id, nome FROM professores WHERE nome LIKE '%Ana%'");
    let model = MockLlm::new(vec![vec![first.as_str()]]);
    let hinter = hinter(database(), vec![(model.clone(), 1)]);

    let hint = hinter.hint(&question(), &HistoryView::empty()).await.unwrap();

    assert_eq!(hint.name, "search_result");
    assert_eq!(
        hint.content,
        "The user query returned the following results:\n\nColumn names: id\tnome\nRows:\n1\tAna Souza"
    );
    assert_eq!(model.requests()[0].1, 1);
}

#[tokio::test]
async fn test_apology_when_nothing_parses() {
    let model = MockLlm::new(vec![
        vec!["I cannot answer that.", "ThinkStepByStep: not enough information"],
        vec!["SQLQuery: ```sql\n```"],
    ]);
    let hinter = hinter(database(), vec![(model.clone(), 2), (model, 1)]);

    let hint = hinter.hint(&question(), &HistoryView::empty()).await.unwrap();
    assert_eq!(hint.content, sql::NO_QUERY_TEXT);
}

#[tokio::test]
async fn test_restricted_queries_never_run() {
    let drop = answer("SELECT * FROM professores; DROP TABLE professores");
    let count = answer("SELECT COUNT(*) AS total FROM professores");
    let model = MockLlm::new(vec![vec![drop.as_str(), count.as_str()]]);
    let executor = database();
    let hinter = hinter(executor.clone(), vec![(model, 2)]);

    let result = hinter
        .generate_enhanced_query(&question(), &HistoryView::empty())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.query, "SELECT COUNT(*) AS total FROM professores");
    assert_eq!(result.result_rows().unwrap(), &[vec!["2".to_string()]]);
    assert!(!executor.execute("SELECT nome FROM professores").await.is_error());
}

#[tokio::test]
async fn test_fewest_rows_wins_within_a_round() {
    let all = answer("SELECT nome FROM professores");
    let one = answer("SELECT nome FROM professores WHERE nome LIKE '%Bruno%'");
    let model = MockLlm::new(vec![vec![all.as_str(), one.as_str()]]);
    let hinter = hinter(database(), vec![(model, 2)]);

    let result = hinter
        .generate_enhanced_query(&question(), &HistoryView::empty())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.result_rows().unwrap()[0], vec!["Bruno Lima".to_string()]);
}

#[tokio::test]
async fn test_enhance_round_sees_previous_error() {
    let broken = answer("SELECT nome FROM professor");
    let fixed = answer("SELECT nome FROM professores");
    let generator = MockLlm::new(vec![vec![broken.as_str()]]);
    let enhancer = MockLlm::new(vec![vec![fixed.as_str()]]);
    let hinter = hinter(database(), vec![(generator.clone(), 1), (enhancer.clone(), 1)]);

    let result = hinter
        .generate_enhanced_query(&question(), &HistoryView::empty())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.row_count(), 2);

    let first = &generator.requests()[0].0;
    assert!(first[0].content.starts_with("Generate a single sqlite query"));
    assert_eq!(first[1].name.as_deref(), Some("database_schema"));
    assert_eq!(first[1].content, SCHEMA);
    assert_eq!(first.len(), 3);

    let second = &enhancer.requests()[0].0;
    assert!(second[0].content.starts_with("Examine the query"));
    assert_eq!(second[2].name.as_deref(), Some("query"));
    assert_eq!(second[2].content, "SELECT nome FROM professor");
    assert_eq!(second[3].name.as_deref(), Some("error"));
    assert!(second[3].content.contains("no such table"));
    assert_eq!(second[4].role, Role::User);
    assert_eq!(second[4].content, "quantos professores existem?");
}

#[tokio::test]
async fn test_erroring_round_keeps_previous_result() {
    let good = answer("SELECT nome FROM professores");
    let bad = answer("SELECT nome FROM nowhere");
    let model = MockLlm::new(vec![vec![good.as_str()], vec![bad.as_str()], vec!["no query"]]);
    let hinter = hinter(
        database(),
        vec![(model.clone(), 1), (model.clone(), 1), (model.clone(), 1)],
    );

    let result = hinter
        .generate_enhanced_query(&question(), &HistoryView::empty())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.query, "SELECT nome FROM professores");

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    // A successful previous query is reported without errors.
    assert_eq!(requests[1].0[3].content, sql::NO_ERROR_MARKER);
    // The third round still sees the last good query, not the failed one.
    assert_eq!(requests[2].0[2].content, "SELECT nome FROM professores");
}

#[tokio::test]
async fn test_only_errors_gives_error_hint() {
    let bad = answer("SELECT nome FROM nowhere");
    let model = MockLlm::new(vec![vec![bad.as_str()]]);
    let hinter = hinter(database(), vec![(model, 1)]);

    let hint = hinter.hint(&question(), &HistoryView::empty()).await.unwrap();
    assert_eq!(hint.content, sql::QUERY_ERROR_TEXT);
}

#[tokio::test]
async fn test_long_results_are_truncated() {
    let all = answer("SELECT nome FROM professores ORDER BY id");
    let model = MockLlm::new(vec![vec![all.as_str()]]);
    let hinter = hinter(database(), vec![(model, 1)]).with_limit_results(1);

    let hint = hinter.hint(&question(), &HistoryView::empty()).await.unwrap();
    assert!(hint.content.contains("Rows:\nAna Souza\n...\n1 rows omitted."));
    assert!(!hint.content.contains("Bruno"));
}

#[tokio::test]
async fn test_context_is_passed_to_the_model() {
    let mut history = History::new();
    history.add_message(ChatMessage::user("Ana", "conhece a professora Ana Souza?"));
    history.add_message(ChatMessage::assistant("Jota", "Sim!").replying_to(0));

    let model = MockLlm::new(vec![vec!["no query"]]);
    let hinter = hinter(database(), vec![(model.clone(), 1)]);
    let message = ChatMessage::user("Ana", "  qual o id dela?  ");
    let view = history.last_n_messages(20);
    hinter.hint(&message, &view).await.unwrap();

    let messages = &model.requests()[0].0;
    assert_eq!(messages.len(), 5);
    assert!(messages[2].content.contains("conhece a professora Ana Souza?"));
    assert!(messages[3].content.starts_with("#1 Jota (reply to #0)"));
    assert_eq!(messages[4].content, "qual o id dela?");
}

#[tokio::test]
async fn test_provider_errors_propagate() {
    let model = MockLlm::new(vec![]);
    let hinter = hinter(database(), vec![(model, 1)]);
    let result = hinter.hint(&question(), &HistoryView::empty()).await;
    assert!(matches!(result, Err(JotaError::Llm(_))));
}

#[tokio::test]
async fn test_end_to_end_professor_count() {
    let classifier_llm = MockLlm::new(vec![vec![" courses"]]);
    let count = answer("SELECT COUNT(*) AS total, MIN(nome) AS primeiro FROM professores");
    let sql_llm = MockLlm::new(vec![vec![count.as_str()]]);
    let chat_llm = MockLlm::streaming(vec![
        StreamEvent::TextDelta("Existem 2 professores.".into()),
        StreamEvent::Done,
    ]);

    let classifier = ClassificationAgent::new(
        classifier_llm,
        vec![
            Category::new("courses", "Questions related to the courses database."),
            Category::new("general", "General conversation questions."),
        ],
    );
    let router = HintRouter::new().with_hinter(
        "courses",
        Box::new(hinter(database(), vec![(sql_llm, 1)])),
    );
    let mut agent = ConversationalAgent::new(chat_llm.clone())
        .with_classifier(classifier)
        .with_router(router);

    let reply = agent.reply(question()).await.unwrap();
    assert_eq!(reply.content, "Existem 2 professores.");

    let hint = reply.hint.unwrap();
    assert!(hint.contains("Column names: total\tprimeiro\nRows:\n2\tAna Souza"));

    let recorded = agent.history().get(1).unwrap();
    assert!(matches!(recorded, HistoryEntry::Hint(h) if h.content == hint));

    let sent = &chat_llm.requests()[0].0;
    assert!(sent
        .iter()
        .any(|m| m.name.as_deref() == Some("search_result") && m.content == hint));
}
