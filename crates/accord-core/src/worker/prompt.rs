use std::collections::BTreeMap;

use regex::{NoExpand, Regex};

use crate::models::{CoreError, CoreErrorKind};
use crate::worker::content::{ContentStore, is_content_hash};

pub type PromptResult<T> = Result<T, CoreError>;

const MODEL_PREFIX: &str = "model:";
const RESULT_OPEN_TAG: &str = "<result>";
const RESULT_CLOSE_TAG: &str = "</result>";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedConfig {
    pub model: Option<String>,
    pub template: String,
}

/// Splits a config blob into an optional `model: <variant>/<name>` first
/// line and the prompt template. Without the model line the whole blob is
/// the template and the variant must come from task metadata.
pub fn parse_config(blob: &str) -> ResolvedConfig {
    let (first_line, rest) = match blob.split_once('\n') {
        Some((first_line, rest)) => (first_line, rest),
        None => (blob, ""),
    };
    if let Some(model) = first_line.strip_prefix(MODEL_PREFIX) {
        return ResolvedConfig {
            model: Some(model.trim().to_string()),
            template: rest.to_string(),
        };
    }
    ResolvedConfig {
        model: None,
        template: blob.to_string(),
    }
}

/// Replaces every `{{key}}` occurrence (whitespace-tolerant inside the
/// braces) with the input value for `key`. A value that is itself a content
/// hash is resolved through the store first.
pub fn render_prompt(
    template: &str,
    inputs: &BTreeMap<String, String>,
    content: &dyn ContentStore,
) -> PromptResult<String> {
    let mut prompt = template.to_string();
    for (key, value) in inputs {
        let pattern = placeholder_pattern(key)?;
        if !pattern.is_match(&prompt) {
            continue;
        }
        let resolved = if is_content_hash(value) {
            content.get(value)?
        } else {
            value.clone()
        };
        prompt = pattern
            .replace_all(&prompt, NoExpand(&resolved))
            .into_owned();
    }
    Ok(prompt)
}

/// Text strictly between the first `<result>` and the next `</result>`,
/// running to end-of-text when the close tag is missing. Without an opening
/// tag the raw text comes back unchanged.
pub fn extract_result_tag(raw: &str) -> String {
    let Some(start) = raw.find(RESULT_OPEN_TAG) else {
        tracing::debug!("no opening result tag in output; returning raw text");
        return raw.to_string();
    };
    let body = &raw[start + RESULT_OPEN_TAG.len()..];
    let body = match body.find(RESULT_CLOSE_TAG) {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

fn placeholder_pattern(key: &str) -> PromptResult<Regex> {
    Regex::new(&format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key))).map_err(|error| CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::ConfigResolution,
        message: format!("placeholder pattern for input '{key}' failed to compile: {error}"),
    })
}
