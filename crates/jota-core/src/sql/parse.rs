use crate::constants::sql;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn field_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(\w+):\s+").expect("valid field regex"))
}

fn fenced_query() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^(?:```(?:sql(?:ite)?)?)?(?P<query>.*?)(?:```)?$").expect("valid fence regex")
    })
}

/// Split a completion into `Label: value` fields.
///
/// A label is a word at the start of a line followed by `:` and whitespace;
/// its value runs until the next label or the end of the text. Repeated
/// labels keep the last value.
pub fn separate_fields(completion: &str) -> HashMap<String, String> {
    let labels: Vec<_> = field_label().captures_iter(completion).collect();
    let mut fields = HashMap::new();

    for (i, caps) in labels.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = labels
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(completion.len(), |m| m.start());
        let value = completion[whole.end()..end].trim();
        fields.insert(name.as_str().to_string(), value.to_string());
    }

    fields
}

/// Strip code fences and a leading `sql`/`sqlite` tag from a query value.
pub fn extract_query(value: &str) -> Option<String> {
    let caps = fenced_query().captures(value.trim())?;
    let query = caps.name("query")?.as_str().trim();
    if query.is_empty() {
        None
    } else {
        Some(query.to_string())
    }
}

/// Pull the SQL query out of one raw completion, if it has one.
pub fn parse_candidate(completion: &str) -> Option<String> {
    let fields = separate_fields(completion);
    extract_query(fields.get(sql::QUERY_FIELD)?)
}

/// Whether a candidate is free of restricted keywords.
///
/// Plain substring search on the lowercased text: a keyword inside a string
/// literal or a longer identifier (`updated_at`) also disqualifies.
pub fn is_safe_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    !sql::RESTRICTED_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separate_fields() {
        let completion = "ThinkStepByStep: find the professors table.\nCount rows.\n\nSQLQuery: SELECT COUNT(*) FROM professores";
        let fields = separate_fields(completion);
        assert_eq!(fields["ThinkStepByStep"], "find the professors table.\nCount rows.");
        assert_eq!(fields["SQLQuery"], "SELECT COUNT(*) FROM professores");
    }

    #[test]
    fn test_value_may_start_on_next_line() {
        let completion = "ThinkStepByStep: easy\nSQLQuery:\n```sql\nSELECT *\nFROM cursos\n```";
        assert_eq!(
            parse_candidate(completion).as_deref(),
            Some("SELECT *\nFROM cursos")
        );
    }

    #[test]
    fn test_missing_query_field() {
        assert_eq!(parse_candidate("I cannot answer that with a single query."), None);
        assert_eq!(parse_candidate("ThinkStepByStep: no idea"), None);
    }

    #[test]
    fn test_extract_query_strips_fences_and_tags() {
        assert_eq!(extract_query("```sql\nSELECT 1\n```").as_deref(), Some("SELECT 1"));
        assert_eq!(extract_query("```SQLite\nSELECT 2```").as_deref(), Some("SELECT 2"));
        assert_eq!(extract_query("```\nSELECT 3\n```").as_deref(), Some("SELECT 3"));
        assert_eq!(extract_query("  SELECT 4  ").as_deref(), Some("SELECT 4"));
        assert_eq!(extract_query("```sql\n```"), None);
    }

    #[test]
    fn test_safety_filter() {
        assert!(!is_safe_query("SELECT * FROM X; DROP TABLE X"));
        assert!(!is_safe_query("delete from cursos"));
        assert!(!is_safe_query("SELECT * FROM t WHERE note = 'Please UPDATE me'"));
        assert!(!is_safe_query("PrAgMa table_info(cursos)"));
        assert!(is_safe_query("SELECT * FROM Cursos"));
        assert!(is_safe_query("SELECT nome FROM professores WHERE nome LIKE '%Silva%'"));
    }
}
