use std::fmt::Write;

use crate::models::Frame;

const OCR_EXCERPT_CHARS: usize = 200;

/// Builds the coherence request for a cluster's sampled frames.
pub fn build_prompt(samples: &[&Frame]) -> String {
    let mut prompt = String::from(
        "The following screen captures were taken in sequence during one work session.\n\
         Decide whether they show a single coherent task.\n\n",
    );

    for (index, frame) in samples.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "Frame {} at {} | app: {} | window: {}",
            index + 1,
            frame.timestamp.format("%H:%M:%S"),
            frame.app_name,
            frame.window_title
        );
        if let Some(summary) = frame.caption_text() {
            let _ = writeln!(prompt, "  summary: {summary}");
        }
        if let Some(text) = frame.ocr_text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let _ = writeln!(prompt, "  screen text: {}", truncate(text, OCR_EXCERPT_CHARS));
        }
    }

    prompt.push_str(
        "\nReply with JSON only, no prose:\n\
         {\"isCoherentTask\": boolean, \"taskName\": string, \"description\": string, \
         \"success\": boolean or null, \"relevance\": number between 0 and 1}\n",
    );
    prompt
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn prompt_lists_every_sample_and_requested_fields() {
        let a = Frame::new("s", 1, Utc::now(), "Xcode")
            .with_window_title("App.swift")
            .with_summary("Fixing a build error");
        let b = Frame::new("s", 2, Utc::now(), "Simulator").with_ocr_text("Build\n  Succeeded");

        let prompt = build_prompt(&[&a, &b]);

        assert!(prompt.contains("Frame 1"));
        assert!(prompt.contains("app: Xcode | window: App.swift"));
        assert!(prompt.contains("summary: Fixing a build error"));
        assert!(prompt.contains("screen text: Build Succeeded"));
        for field in ["isCoherentTask", "taskName", "description", "success", "relevance"] {
            assert!(prompt.contains(field), "missing {field}");
        }
    }

    #[test]
    fn long_screen_text_is_truncated() {
        let long = "word ".repeat(200);
        let frame = Frame::new("s", 1, Utc::now(), "Notes").with_ocr_text(long);
        let prompt = build_prompt(&[&frame]);
        assert!(prompt.contains("..."));
        assert!(prompt.len() < 800);
    }
}
