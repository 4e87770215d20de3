//! Prompt templates for SQL candidate generation. `{engine}` is replaced with
//! the executor's dialect before sending.

const THINK_STEP_BY_STEP: &str = "ThinkStepByStep: \
[extract relevant table names, relevant given information, relevant columns. \
Give a step by step reasoning of the parts that make up the query.]";

const THINK_STEP_BY_STEP_ENHANCE: &str = "ThinkStepByStep: \
[answer the previous questions, step by step. \
Explain what should be done to fix the query, step by step.]";

const SQL_QUERY: &str = "SQLQuery: \
[write a single {engine} query that answers the prompt. \
Only use tables and columns described in the database schema. \
When comparing names, always use LIKE and %, avoid using = in this case.]";

/// First round: write a query from scratch.
pub fn generate_template() -> String {
    format!(
        "Generate a single {{engine}} query to the database that answers the user's prompt.\n\
Use the history messages to provide context to the query.\n\
If more than one {{engine}} query would be required, refuse to answer.\n\
If there is not enough information to generate a valid query, refuse to answer.\n\
Distinguish between machine-readable IDs and human-readable names.\n\
\n\
Provide your response in the following format:\n\
\n\
{THINK_STEP_BY_STEP}\n\
\n\
{SQL_QUERY}"
    )
}

/// Later rounds: audit and repair the previous query.
pub fn enhance_template() -> String {
    format!(
        "Examine the query, the user prompt and possible errors that occurred when executing the query.\n\
\n\
Answer the following questions:\n\
- Does the query compare machine-readable IDs only with columns meant for machine-readable IDs?\n\
- Does the query compare human-readable names only with columns meant for human-readable names?\n\
- Does the query compare human-readable names using LIKE and %?\n\
- Does the query make good use of the information provided by the user?\n\
- Is any information provided by the user missing from the query?\n\
\n\
Fix the query if anything is wrong with it. Create a completely new query if necessary.\n\
\n\
Provide your response in the following format:\n\
\n\
{THINK_STEP_BY_STEP_ENHANCE}\n\
\n\
{SQL_QUERY}"
    )
}

pub fn render(template: &str, engine: &str) -> String {
    template.replace("{engine}", engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_template_mentions_engine_and_fields() {
        let prompt = render(&generate_template(), "sqlite");
        assert!(prompt.starts_with("Generate a single sqlite query"));
        assert!(prompt.contains("\n\nThinkStepByStep: [extract relevant table names"));
        assert!(prompt.contains("\n\nSQLQuery: [write a single sqlite query"));
        assert!(!prompt.contains("{engine}"));
    }

    #[test]
    fn test_enhance_template_audits_ids_and_like() {
        let prompt = render(&enhance_template(), "postgres");
        assert!(prompt.contains("machine-readable IDs only with columns meant for machine-readable IDs"));
        assert!(prompt.contains("human-readable names using LIKE and %"));
        assert!(prompt.contains("ThinkStepByStep: [answer the previous questions"));
        assert!(prompt.contains("SQLQuery: [write a single postgres query"));
    }
}
