//! Extraction of risk verdicts from streamed model text.
//!
//! The model is told to answer with `{"risk_level": <int>, "reason": <string>}`
//! but may wrap it in a markdown fence or emit prose while still composing.
//! Anything that does not parse as a JSON object is treated as an in-progress
//! fragment and produces no verdict.

use serde_json::Value;
use tracing::{debug, warn};

/// Reason reported when the model omits one.
pub const DEFAULT_REASON: &str = "Scanning...";
/// Verdicts above this level are treated as an active threat.
pub const DEFAULT_DANGER_THRESHOLD: i32 = 85;

const MAX_ACCUMULATED_BYTES: usize = 16 * 1024;

/// A single verdict. `risk_level` is nominally 0-100 but is passed through unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub risk_level: i32,
    pub reason: String,
}

impl RiskAssessment {
    pub fn is_danger(&self, threshold: i32) -> bool {
        self.risk_level > threshold
    }
}

/// Trims whitespace and a surrounding markdown code fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parses a verdict from one piece of model text, or `None` if it is not a JSON object.
pub fn parse_risk(text: &str) -> Option<RiskAssessment> {
    let value: Value = serde_json::from_str(strip_code_fence(text)).ok()?;
    let object = value.as_object()?;

    let risk_level = object.get("risk_level").map_or(0, risk_level_from);
    let reason = match object.get("reason") {
        None | Some(Value::Null) => DEFAULT_REASON.to_string(),
        Some(Value::String(reason)) => reason.clone(),
        Some(other) => other.to_string(),
    };
    Some(RiskAssessment { risk_level, reason })
}

fn risk_level_from(value: &Value) -> i32 {
    let level = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    };
    level.map_or(0, |l| l.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

/// Feeds model text fragments through [`parse_risk`].
///
/// With accumulation off every fragment stands alone. With it on, fragments
/// that fail to parse are concatenated until the turn's text forms a complete
/// object, the turn ends, or the buffer grows past 16 KiB.
#[derive(Debug, Default)]
pub struct RiskParser {
    accumulate: bool,
    buffer: String,
}

impl RiskParser {
    pub fn new(accumulate: bool) -> Self {
        Self {
            accumulate,
            buffer: String::new(),
        }
    }

    pub fn feed(&mut self, fragment: &str) -> Option<RiskAssessment> {
        if let Some(assessment) = parse_risk(fragment) {
            self.buffer.clear();
            return Some(assessment);
        }
        if !self.accumulate {
            debug!(fragment, "Non-JSON model text");
            return None;
        }

        self.buffer.push_str(fragment);
        if let Some(assessment) = parse_risk(&self.buffer) {
            self.buffer.clear();
            return Some(assessment);
        }
        if self.buffer.len() > MAX_ACCUMULATED_BYTES {
            warn!(bytes = self.buffer.len(), "Discarding oversized model text buffer");
            self.buffer.clear();
        }
        None
    }

    /// Drops any partial text at a turn boundary.
    pub fn end_turn(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(risk_level: i32, reason: &str) -> Option<RiskAssessment> {
        Some(RiskAssessment {
            risk_level,
            reason: reason.to_string(),
        })
    }

    #[test]
    fn test_fenced_verdict() {
        let text = "```json\n{\"risk_level\": 92, \"reason\": \"Threat detected\"}\n```";
        assert_eq!(parse_risk(text), assessment(92, "Threat detected"));
    }

    #[test]
    fn test_partial_text_yields_nothing() {
        assert_eq!(parse_risk("I think"), None);
        assert_eq!(parse_risk("{\"risk_level\": 4"), None);
        assert_eq!(parse_risk(""), None);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        assert_eq!(
            parse_risk("{\"reason\": \"calm conversation\"}"),
            assessment(0, "calm conversation")
        );
        assert_eq!(parse_risk("{\"risk_level\": 12}"), assessment(12, DEFAULT_REASON));
        assert_eq!(parse_risk("{}"), assessment(0, DEFAULT_REASON));
    }

    #[test]
    fn test_loose_field_types() {
        assert_eq!(
            parse_risk("{\"risk_level\": \"70\", \"reason\": null}"),
            assessment(70, DEFAULT_REASON)
        );
        assert_eq!(parse_risk("{\"risk_level\": 55.9, \"reason\": 3}"), assessment(55, "3"));
        assert_eq!(parse_risk("{\"risk_level\": true}"), assessment(0, DEFAULT_REASON));
        assert_eq!(parse_risk("{\"risk_level\": 1e12}"), assessment(i32::MAX, DEFAULT_REASON));
    }

    #[test]
    fn test_non_object_json_is_ignored() {
        assert_eq!(parse_risk("42"), None);
        assert_eq!(parse_risk("[{\"risk_level\": 1}]"), None);
        assert_eq!(parse_risk("\"risk\""), None);
    }

    #[test]
    fn test_fence_stripping_is_idempotent() {
        let plain = "{\"risk_level\": 40, \"reason\": \"pressure to pay\"}";
        let fenced = format!("```json\n{plain}\n```");
        let bare_fenced = format!("```\n{plain}\n```");
        assert_eq!(strip_code_fence(&fenced), plain);
        assert_eq!(strip_code_fence(strip_code_fence(&fenced)), plain);
        assert_eq!(parse_risk(plain), parse_risk(&fenced));
        assert_eq!(parse_risk(plain), parse_risk(&bare_fenced));
    }

    #[test]
    fn test_danger_threshold() {
        let high = RiskAssessment {
            risk_level: 86,
            reason: String::new(),
        };
        let edge = RiskAssessment {
            risk_level: DEFAULT_DANGER_THRESHOLD,
            reason: String::new(),
        };
        assert!(high.is_danger(DEFAULT_DANGER_THRESHOLD));
        assert!(!edge.is_danger(DEFAULT_DANGER_THRESHOLD));
    }

    #[test]
    fn test_parser_without_accumulation_is_stateless() {
        let mut parser = RiskParser::new(false);
        assert_eq!(parser.feed("{\"risk_level\": 4"), None);
        assert_eq!(parser.feed("0, \"reason\": \"x\"}"), None);
        assert_eq!(parser.feed("{\"risk_level\": 5}"), assessment(5, DEFAULT_REASON));
    }

    #[test]
    fn test_parser_accumulates_split_object() {
        let mut parser = RiskParser::new(true);
        assert_eq!(parser.feed("```json\n{\"risk_level\": 4"), None);
        assert_eq!(
            parser.feed("0, \"reason\": \"caller demands gift cards\"}\n```"),
            assessment(40, "caller demands gift cards")
        );
        // The buffer was consumed by the verdict.
        assert_eq!(parser.feed("I think"), None);
        parser.end_turn();
        assert_eq!(parser.feed("{\"reason\": \"ok\"}"), assessment(0, "ok"));
    }

    #[test]
    fn test_parser_turn_end_discards_partial_text() {
        let mut parser = RiskParser::new(true);
        assert_eq!(parser.feed("{\"risk_level\": 9"), None);
        parser.end_turn();
        assert_eq!(parser.feed("0}"), None);
    }

    #[test]
    fn test_parser_caps_buffer() {
        let mut parser = RiskParser::new(true);
        let noise = "x".repeat(MAX_ACCUMULATED_BYTES + 1);
        assert_eq!(parser.feed(&noise), None);
        assert!(parser.buffer.is_empty());
    }
}
