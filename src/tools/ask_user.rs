//! `ask_user` — surfaces clarifying questions to the operator instead of
//! guessing (spec.md §4.5.11). In a non-interactive CLI runtime the tool
//! cannot block for an answer: it validates and formats the question set and
//! returns it as `awaiting_response`, letting the caller decide how to
//! collect a response (stdin prompt, UI surface, or abort).

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const MAX_QUESTIONS: usize = 4;
const MAX_OPTIONS: usize = 4;
const MIN_OPTIONS: usize = 2;

fn format_question(q: &Value) -> String {
    let header = q["header"].as_str().unwrap_or("");
    let question = q["question"].as_str().unwrap_or("");
    let q_type = q["type"].as_str().unwrap_or("choice");
    let mut out = format!("\n**[{header}]** {question}");

    match q_type {
        "choice" => {
            if let Some(options) = q["options"].as_array() {
                out.push_str("\nOptions:");
                for (j, opt) in options.iter().enumerate() {
                    let label = opt["label"].as_str().unwrap_or("");
                    let desc = opt["description"].as_str().unwrap_or("");
                    out.push_str(&format!("\n  {}. {label}", j + 1));
                    if !desc.is_empty() {
                        out.push_str(&format!(" - {desc}"));
                    }
                }
                if q["multiSelect"].as_bool().unwrap_or(false) {
                    out.push_str("\n  (Multiple selections allowed)");
                }
            }
        }
        "yesno" => out.push_str("\n  [Yes / No]"),
        "text" => {
            if let Some(placeholder) = q["placeholder"].as_str() {
                if !placeholder.is_empty() {
                    out.push_str(&format!("\n  (Hint: {placeholder})"));
                }
            }
        }
        _ => {}
    }
    out
}

pub struct AskUserTool;

impl AskUserTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AskUserTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user one or more clarifying questions (choice, free-form text, or yes/no) \
         when the task is ambiguous or a decision materially affects the outcome. Up to 4 \
         questions per call."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "maxItems": MAX_QUESTIONS,
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {"type": "string"},
                            "header": {"type": "string", "description": "Short label, max 12 chars"},
                            "type": {"type": "string", "enum": ["choice", "text", "yesno"]},
                            "options": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "label": {"type": "string"},
                                        "description": {"type": "string"}
                                    },
                                    "required": ["label"]
                                }
                            },
                            "multiSelect": {"type": "boolean"},
                            "placeholder": {"type": "string"}
                        },
                        "required": ["question", "header"]
                    }
                }
            },
            "required": ["questions"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let questions = match args["questions"].as_array() {
            Some(q) if !q.is_empty() => q,
            _ => {
                return ToolResult::err(
                    "At least one question is required.",
                    ToolErrorType::InvalidInput,
                )
            }
        };

        if questions.len() > MAX_QUESTIONS {
            return ToolResult::err(
                format!("Maximum {MAX_QUESTIONS} questions allowed."),
                ToolErrorType::InvalidInput,
            );
        }

        let mut validated = Vec::with_capacity(questions.len());

        for (i, q) in questions.iter().enumerate() {
            if !q.is_object() {
                return ToolResult::err(
                    format!("Question {}: Must be an object.", i + 1),
                    ToolErrorType::InvalidParameter,
                );
            }
            let question_text = q["question"].as_str().unwrap_or("");
            if question_text.is_empty() {
                return ToolResult::err(
                    format!("Question {}: 'question' is required.", i + 1),
                    ToolErrorType::InvalidParameter,
                );
            }
            let header = q["header"].as_str().unwrap_or("");
            if header.is_empty() {
                return ToolResult::err(
                    format!("Question {}: 'header' is required.", i + 1),
                    ToolErrorType::InvalidParameter,
                );
            }
            let q_type = q["type"].as_str().unwrap_or("choice");

            let options = if q_type == "choice" {
                let options = match q["options"].as_array() {
                    Some(o) => o,
                    None => {
                        return ToolResult::err(
                            format!("Question {}: 'choice' type requires {MIN_OPTIONS}-{MAX_OPTIONS} options.", i + 1),
                            ToolErrorType::InvalidParameter,
                        )
                    }
                };
                if options.len() < MIN_OPTIONS {
                    return ToolResult::err(
                        format!("Question {}: 'choice' type requires {MIN_OPTIONS}-{MAX_OPTIONS} options.", i + 1),
                        ToolErrorType::InvalidParameter,
                    );
                }
                if options.len() > MAX_OPTIONS {
                    return ToolResult::err(
                        format!("Question {}: Maximum {MAX_OPTIONS} options allowed.", i + 1),
                        ToolErrorType::InvalidParameter,
                    );
                }
                for (j, opt) in options.iter().enumerate() {
                    if !opt.is_object() {
                        return ToolResult::err(
                            format!("Question {}, option {}: Must be an object.", i + 1, j + 1),
                            ToolErrorType::InvalidParameter,
                        );
                    }
                    if opt["label"].as_str().unwrap_or("").is_empty() {
                        return ToolResult::err(
                            format!("Question {}, option {}: 'label' is required.", i + 1, j + 1),
                            ToolErrorType::InvalidParameter,
                        );
                    }
                }
                Some(options.clone())
            } else {
                None
            };

            validated.push(json!({
                "index": i,
                "question": question_text,
                "header": header,
                "type": q_type,
                "options": options,
                "multiSelect": if q_type == "choice" { q["multiSelect"].as_bool().unwrap_or(false) } else { Value::Null },
                "placeholder": if q_type == "text" { q["placeholder"].clone() } else { Value::Null },
            }));
        }

        let formatted: Vec<String> = validated.iter().map(format_question).collect();
        let formatted_display = formatted.join("\n");

        ToolResult::ok_with_data(
            formatted_display.clone(),
            "Please answer the following question(s):",
            json!({
                "type": "ask_user",
                "questions": validated,
                "formatted_display": formatted_display,
                "message": "Please answer the following question(s):",
                "awaiting_response": true,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_valid_choice_question() {
        let tool = AskUserTool::new();
        let result = tool
            .invoke(json!({"questions": [{
                "question": "Which database?",
                "header": "db",
                "type": "choice",
                "options": [{"label": "postgres"}, {"label": "sqlite"}]
            }]}))
            .await;
        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert_eq!(data["awaiting_response"], true);
    }

    #[tokio::test]
    async fn rejects_empty_questions() {
        let tool = AskUserTool::new();
        let result = tool.invoke(json!({"questions": []})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidInput);
    }

    #[tokio::test]
    async fn rejects_too_many_questions() {
        let tool = AskUserTool::new();
        let q = json!({"question": "q", "header": "h", "type": "yesno"});
        let result = tool
            .invoke(json!({"questions": [q.clone(), q.clone(), q.clone(), q.clone(), q]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidInput);
    }

    #[tokio::test]
    async fn rejects_choice_with_one_option() {
        let tool = AskUserTool::new();
        let result = tool
            .invoke(json!({"questions": [{
                "question": "Pick one", "header": "pick", "type": "choice",
                "options": [{"label": "only"}]
            }]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidParameter);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let tool = AskUserTool::new();
        let result = tool
            .invoke(json!({"questions": [{"question": "q", "type": "yesno"}]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidParameter);
    }

    #[tokio::test]
    async fn yesno_question_formats_without_options() {
        let tool = AskUserTool::new();
        let result = tool
            .invoke(json!({"questions": [{"question": "Proceed?", "header": "confirm", "type": "yesno"}]}))
            .await;
        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert!(data["formatted_display"].as_str().unwrap().contains("[Yes / No]"));
    }
}
