use serde_json::Value;

use super::{ClusterJudgment, JudgeReply};
use crate::models::DEFAULT_RELEVANCE;

/// Reads a collaborator reply into a judgment.
///
/// Accepts bare JSON, JSON wrapped in Markdown fences, or JSON embedded in
/// prose. `isCoherentTask` is required; the other fields fall back to
/// empty/unknown values. Relevance is clamped into [0, 1].
pub fn parse_judgment(raw: &str) -> JudgeReply {
    let Some(value) = find_judgment_value(raw) else {
        return JudgeReply::ParseError(format!("no JSON object in reply: {}", excerpt(raw)));
    };

    let Some(is_coherent_task) = field(&value, &["isCoherentTask", "is_coherent_task"])
        .and_then(as_bool)
    else {
        return JudgeReply::ParseError("missing boolean isCoherentTask".into());
    };

    let task_name = field(&value, &["taskName", "task_name"])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let description = field(&value, &["description"])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let success = field(&value, &["success"]).and_then(as_bool);
    let relevance = field(&value, &["relevance"])
        .and_then(as_f64)
        .filter(|r| r.is_finite())
        .map(|r| r.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_RELEVANCE);

    JudgeReply::Parsed(ClusterJudgment {
        is_coherent_task,
        task_name,
        description,
        success,
        relevance,
    })
}

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| value.get(*name))
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Picks the JSON object to read from a reply.
///
/// Every `{` is tried as a start, so braces in surrounding prose are
/// skipped. The first object carrying a coherence flag wins; otherwise the
/// first object that parses at all.
fn find_judgment_value(text: &str) -> Option<Value> {
    let mut fallback = None;

    for (start, _) in text.match_indices('{') {
        let Some(candidate) = balanced_object(&text[start..]) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        if !value.is_object() {
            continue;
        }
        if field(&value, &["isCoherentTask", "is_coherent_task"]).is_some() {
            return Some(value);
        }
        fallback.get_or_insert(value);
    }

    fallback
}

/// Balanced `{...}` at the start of `body`, skipping braces inside strings.
fn balanced_object(body: &str) -> Option<&str> {

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in body.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(80) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> ClusterJudgment {
        match parse_judgment(raw) {
            JudgeReply::Parsed(judgment) => judgment,
            JudgeReply::ParseError(err) => panic!("expected a judgment, got error: {err}"),
        }
    }

    #[test]
    fn parses_plain_json() {
        let judgment = parsed(
            r#"{"isCoherentTask": true, "taskName": "Deploy API", "description": "Ran the deploy", "success": true, "relevance": 0.85}"#,
        );
        assert!(judgment.is_coherent_task);
        assert_eq!(judgment.task_name, "Deploy API");
        assert_eq!(judgment.success, Some(true));
        assert_eq!(judgment.relevance, 0.85);
    }

    #[test]
    fn braces_in_prose_before_the_json_are_skipped() {
        let raw = "Frames show {terminal} work.\n```json\n{\"isCoherentTask\": true, \"taskName\": \"Fix build\", \"relevance\": 0.9}\n```";
        let judgment = parsed(raw);
        assert!(judgment.is_coherent_task);
        assert_eq!(judgment.task_name, "Fix build");
        assert_eq!(judgment.relevance, 0.9);
    }

    #[test]
    fn object_with_coherence_flag_beats_earlier_objects() {
        let raw = r#"Context: {"app": "Terminal"} Verdict: {"is_coherent_task": "yes", "task_name": "Tests"}"#;
        let judgment = parsed(raw);
        assert!(judgment.is_coherent_task);
        assert_eq!(judgment.task_name, "Tests");
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = "Sure! Here is my assessment:\n```json\n{\"isCoherentTask\": false, \"taskName\": \"\", \"description\": \"mixed {stuff}\", \"success\": null, \"relevance\": 0.2}\n```\nLet me know.";
        let judgment = parsed(raw);
        assert!(!judgment.is_coherent_task);
        assert_eq!(judgment.description, "mixed {stuff}");
        assert_eq!(judgment.success, None);
    }

    #[test]
    fn tolerates_string_typed_fields_and_clamps_relevance() {
        let judgment = parsed(r#"{"isCoherentTask": "true", "relevance": "1.4"}"#);
        assert!(judgment.is_coherent_task);
        assert_eq!(judgment.relevance, 1.0);
        assert_eq!(judgment.task_name, "");
    }

    #[test]
    fn missing_relevance_uses_default() {
        let judgment = parsed(r#"{"is_coherent_task": true}"#);
        assert_eq!(judgment.relevance, DEFAULT_RELEVANCE);
    }

    #[test]
    fn non_json_reply_is_a_parse_error() {
        let reply = parse_judgment("I could not look at the screenshots, sorry.");
        assert!(matches!(reply, JudgeReply::ParseError(_)));
        assert_eq!(reply.into_judgment(), ClusterJudgment::default_failure());
    }

    #[test]
    fn truncated_json_is_a_parse_error() {
        let reply = parse_judgment(r#"{"isCoherentTask": true, "taskName": "Wri"#);
        assert!(matches!(reply, JudgeReply::ParseError(_)));
    }

    #[test]
    fn missing_coherence_flag_is_a_parse_error() {
        let reply = parse_judgment(r#"{"taskName": "Something", "relevance": 0.9}"#);
        assert!(matches!(reply, JudgeReply::ParseError(_)));
    }

    #[test]
    fn default_failure_excludes_cluster() {
        let judgment = ClusterJudgment::default_failure();
        assert!(!judgment.is_coherent_task);
        assert_eq!(judgment.relevance, 0.3);
    }
}
