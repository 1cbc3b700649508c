//! Prompt 模板：澄清、规划、检索、评估、扩展、报告
//!
//! 固定 developer 指令可由 config/prompts/instructions.txt 覆盖。

/// 默认 developer 指令（每次请求的 instructions）
pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert Deep Researcher.
You provide complete and in depth research to the user.";

pub const EVALUATE_QUESTION: &str =
    "Does this information fully satisfy the goal? Answer Yes or No only.";

/// 查找 instructions 覆盖文件，找不到则用默认指令
pub fn load_instructions() -> String {
    [
        "config/prompts/instructions.txt",
        "../config/prompts/instructions.txt",
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string())
}

pub fn clarify(topic: &str, count: usize) -> String {
    format!(
        r#"Ask {count} numbered clarifying questions to the user about the topic: {topic}.
The goal of the questions is to understand the intended purpose of the research.
Output: a JSON array of strings with one question per entry, and nothing else.
Format: ["1. ...", "2. ..."]"#
    )
}

pub fn plan(topic: &str, questions: &[String], answers: &[String], count: usize) -> String {
    let qa = questions
        .iter()
        .zip(answers)
        .map(|(q, a)| format!("Q: {}\nA: {}", q, a))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Using the user answers to the questions below, write a goal sentence and {count} web search queries for the research about {topic}

{qa}

Output: A JSON object with the goal and the {count} web search queries that will reach it.
Format: {{"goal": "...", "queries": ["q1", ...]}}"#
    )
}

pub fn search(query: &str) -> String {
    format!("search: {}", query)
}

pub fn research_goal(goal: &str) -> String {
    format!("Research goal: {}", goal)
}

pub fn current_data(findings_json: &str) -> String {
    format!("Current data: {}", findings_json)
}

pub fn expand(goal: &str, count: usize) -> String {
    format!(
        r#"This has not met the goal: {goal}. Write {count} other web searches to achieve the goal.
Output: a JSON array of strings, and nothing else.
Format: ["q1", ...]"#
    )
}

pub fn report(goal: &str) -> String {
    format!(
        "Write a complete and detailed report about research goal: {}. \
Cite sources inline using [n] and append a reference list mapping [n] to url.",
        goal
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_pairs_questions_with_answers() {
        let p = plan(
            "solar panel ROI",
            &["1. Where?".to_string(), "2. Budget?".to_string()],
            &["Texas".to_string(), "$20k".to_string()],
            5,
        );
        assert!(p.contains("Q: 1. Where?\nA: Texas"));
        assert!(p.contains("Q: 2. Budget?\nA: $20k"));
        assert!(p.contains(r#"{"goal": "...", "queries": ["q1", ...]}"#));
    }

    #[test]
    fn test_clarify_mentions_count_and_topic() {
        let p = clarify("solar panel ROI", 5);
        assert!(p.starts_with("Ask 5 numbered clarifying questions"));
        assert!(p.contains("solar panel ROI"));
    }
}
