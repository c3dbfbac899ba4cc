//! LLMs routinely wrap their JSON answer in prose or a markdown fence.
//! This pulls the first well-formed JSON value out of whatever text came
//! back, so callers never have to special-case a chatty model.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

pub fn extract_json(text: &str) -> Result<Value> {
    let unfenced = match FENCE.captures(text) {
        Some(caps) => caps.get(1).unwrap().as_str().to_string(),
        None => text.to_string(),
    };

    if let Ok(v) = serde_json::from_str(unfenced.trim()) {
        return Ok(v);
    }

    if let Some(span) = balanced_span(&unfenced, '{', '}').or_else(|| balanced_span(&unfenced, '[', ']')) {
        if let Ok(v) = serde_json::from_str(span) {
            return Ok(v);
        }
    }

    Err(anyhow!("no valid JSON found in LLM response"))
}

fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0i32;
    for (i, c) in text[start..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + i + c.len_utf8()]);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure, here you go:\n```json\n{\"scores\": [1,2,3]}\n```\nHope that helps!";
        let v = extract_json(text).unwrap();
        assert_eq!(v["scores"][1], 2);
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let text = "The result is {\"ok\": true} as requested.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn errors_on_no_json() {
        assert!(extract_json("no json here at all").is_err());
    }
}
