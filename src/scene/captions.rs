use crate::foundation::error::{SlidecastError, SlidecastResult};

/// One timed caption word.
///
/// A word is active at time `t` iff `start <= t < end`. The invariant
/// `start < end` is enforced at parse/validation time; lookup tolerates
/// unordered and overlapping words.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CaptionWord {
    /// Displayed text.
    pub word: String,
    /// Activation time in seconds, inclusive.
    pub start: f64,
    /// Deactivation time in seconds, exclusive.
    pub end: f64,
}

/// Parse a transcription payload into an ordered caption track.
///
/// The payload must be a JSON list of `{word, start, end}` objects. A
/// non-list payload or a malformed element is a hard [`SlidecastError::CaptionFormat`];
/// it is never silently degraded to an empty track. A well-formed empty list
/// is valid (the video renders without captions).
pub fn parse_transcript(payload: &serde_json::Value) -> SlidecastResult<Vec<CaptionWord>> {
    let items = payload.as_array().ok_or_else(|| {
        SlidecastError::caption_format(format!(
            "transcript payload is not a list (got {})",
            json_kind(payload)
        ))
    })?;

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            SlidecastError::caption_format(format!(
                "transcript word {i} is not an object (got {})",
                json_kind(item)
            ))
        })?;

        let word = obj
            .get("word")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SlidecastError::caption_format(format!("transcript word {i} missing 'word'"))
            })?
            .to_string();
        let start = obj.get("start").and_then(|v| v.as_f64()).ok_or_else(|| {
            SlidecastError::caption_format(format!("transcript word {i} missing 'start'"))
        })?;
        let end = obj.get("end").and_then(|v| v.as_f64()).ok_or_else(|| {
            SlidecastError::caption_format(format!("transcript word {i} missing 'end'"))
        })?;

        out.push(CaptionWord { word, start, end });
    }

    validate_words(&out)?;
    Ok(out)
}

/// Parse a transcription payload from raw JSON text.
pub fn parse_transcript_str(json: &str) -> SlidecastResult<Vec<CaptionWord>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SlidecastError::caption_format(format!("transcript is not valid JSON: {e}")))?;
    parse_transcript(&value)
}

/// Validate caption word invariants (`start < end`, finite times).
pub fn validate_words(words: &[CaptionWord]) -> SlidecastResult<()> {
    for (i, w) in words.iter().enumerate() {
        if !w.start.is_finite() || !w.end.is_finite() {
            return Err(SlidecastError::caption_format(format!(
                "caption word {i} ('{}'): start/end must be finite",
                w.word
            )));
        }
        if w.start >= w.end {
            return Err(SlidecastError::caption_format(format!(
                "caption word {i} ('{}'): start {} must be < end {}",
                w.word, w.start, w.end
            )));
        }
    }
    Ok(())
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_is_an_error_not_an_empty_track() {
        let err = parse_transcript(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, SlidecastError::CaptionFormat(_)));
        assert!(err.to_string().contains("not a list"));
    }

    #[test]
    fn first_element_missing_word_is_an_error() {
        let err = parse_transcript(&serde_json::json!([{"start": 0.0, "end": 1.0}])).unwrap_err();
        assert!(err.to_string().contains("word 0 missing 'word'"));
    }

    #[test]
    fn first_element_missing_start_is_an_error() {
        let err = parse_transcript(&serde_json::json!([{"word": "hi", "end": 1.0}])).unwrap_err();
        assert!(err.to_string().contains("word 0 missing 'start'"));
    }

    #[test]
    fn empty_list_is_a_valid_empty_track() {
        let words = parse_transcript(&serde_json::json!([])).unwrap();
        assert!(words.is_empty());
    }

    #[test]
    fn well_formed_payload_parses_in_order() {
        let words = parse_transcript_str(
            r#"[
                {"word": "hello", "start": 0.0, "end": 0.4},
                {"word": "world", "start": 0.4, "end": 0.9}
            ]"#,
        )
        .unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "hello");
        assert_eq!(words[1].word, "world");
        assert_eq!(words[1].start, 0.4);
    }

    #[test]
    fn start_must_precede_end() {
        let err =
            parse_transcript(&serde_json::json!([{"word": "x", "start": 1.0, "end": 1.0}]))
                .unwrap_err();
        assert!(err.to_string().contains("must be < end"));
    }

    #[test]
    fn non_json_text_is_a_caption_format_error() {
        let err = parse_transcript_str("not json").unwrap_err();
        assert!(matches!(err, SlidecastError::CaptionFormat(_)));
    }
}
