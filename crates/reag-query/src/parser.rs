//! Parse model output into judgments

use crate::error::BatchError;
use crate::schema::{FieldType, OutputSchema};
use reag_domain::{Judgment, ModelOutput};
use serde_json::{Map, Value};

/// Parse one batch's model output into exactly `expected` judgments
///
/// Checks run in order: structural parse, judgment count, then each item
/// against the baseline fields and `schema`. A response with both the wrong
/// count and invalid items reports the count.
pub fn parse_response(
    output: &ModelOutput,
    expected: usize,
    schema: &OutputSchema,
) -> Result<Vec<Judgment>, BatchError> {
    let (value, think) = match output {
        ModelOutput::Structured(value) => (value.clone(), None),
        ModelOutput::Text(text) => {
            let (think, rest) = split_think(text);
            (parse_json(rest, text)?, think)
        }
    };

    let items = unwrap_envelope(value, output)?;
    if items.len() != expected {
        return Err(BatchError::CountMismatch {
            expected,
            actual: items.len(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item, schema, think.as_deref()))
        .collect()
}

/// Separate a leading `<think>...</think>` block from the answer
fn split_think(text: &str) -> (Option<String>, &str) {
    let trimmed = text.trim_start();
    if let Some(after_open) = trimmed.strip_prefix("<think>") {
        if let Some(close) = after_open.find("</think>") {
            let thought = after_open[..close].trim();
            let rest = &after_open[close + "</think>".len()..];
            let thought = (!thought.is_empty()).then(|| thought.to_string());
            return (thought, rest);
        }
    }
    (None, text)
}

/// Extract JSON from text, handling markdown code blocks
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(fenced) = trimmed.strip_prefix("```") {
        // Skip the opening fence line, with or without a language tag
        let body = fenced.split_once('\n').map_or("", |(_, body)| body);
        let body = body.trim_end();
        return body.strip_suffix("```").unwrap_or(body).trim();
    }

    trimmed
}

fn parse_json(text: &str, raw: &str) -> Result<Value, BatchError> {
    let json_str = extract_json(text);
    if json_str.is_empty() {
        return Err(BatchError::Parse {
            message: "empty response".to_string(),
            raw: raw.to_string(),
        });
    }

    match serde_json::from_str(json_str) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            // Prose around the JSON: retry on the outermost bracketed span
            let start = json_str.find(['{', '[']);
            let end = json_str.rfind(['}', ']']);
            if let (Some(start), Some(end)) = (start, end) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&json_str[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(BatchError::Parse {
                message: format!("JSON parse error: {}", first_error),
                raw: raw.to_string(),
            })
        }
    }
}

/// Find the list of judgment items inside the accepted envelopes
fn unwrap_envelope(value: Value, output: &ModelOutput) -> Result<Vec<Value>, BatchError> {
    let shape_error = |message: &str| BatchError::Parse {
        message: message.to_string(),
        raw: output.as_text().into_owned(),
    };

    let mut map = match value {
        Value::Array(items) => return Ok(items),
        Value::Object(map) => map,
        _ => return Err(shape_error("expected a JSON array or object of judgments")),
    };

    if let Some(judgments) = map.remove("judgments") {
        return match judgments {
            Value::Array(items) => Ok(items),
            _ => Err(shape_error("'judgments' is not an array")),
        };
    }

    // Single-judgment envelopes; the count check rejects them for larger batches
    if matches!(map.get("source"), Some(Value::Object(_))) {
        if let Some(source) = map.remove("source") {
            return Ok(vec![source]);
        }
    }
    if looks_like_item(&map) {
        return Ok(vec![Value::Object(map)]);
    }

    if map.len() == 1 {
        if let Some(Value::Array(items)) = map.into_iter().next().map(|(_, v)| v) {
            return Ok(items);
        }
    }

    Err(shape_error("no array of judgments found"))
}

fn looks_like_item(map: &Map<String, Value>) -> bool {
    map.contains_key("content") || map.contains_key("is_irrelevant")
}

fn parse_item(
    index: usize,
    item: &Value,
    schema: &OutputSchema,
    think: Option<&str>,
) -> Result<Judgment, BatchError> {
    let invalid = |field: &str, message: String| BatchError::Validation {
        index,
        field: field.to_string(),
        message,
    };

    let obj = item
        .as_object()
        .ok_or_else(|| invalid("(item)", "is not a JSON object".to_string()))?;

    let content = required(obj, "content", FieldType::String).map_err(|m| invalid("content", m))?;
    let is_irrelevant =
        required(obj, "is_irrelevant", FieldType::Boolean).map_err(|m| invalid("is_irrelevant", m))?;
    let reasoning = optional(obj, "reasoning", FieldType::String).map_err(|m| invalid("reasoning", m))?;

    let mut fields = Map::new();
    for field in &schema.fields {
        let value = if field.required {
            Some(required(obj, &field.name, field.field_type))
        } else {
            optional(obj, &field.name, field.field_type).transpose()
        };
        if let Some(value) = value {
            let value = value.map_err(|m| invalid(&field.name, m))?;
            fields.insert(field.name.clone(), value);
        }
    }

    Ok(Judgment {
        content: content.as_str().unwrap_or_default().to_string(),
        reasoning: reasoning
            .and_then(|r| r.as_str().map(str::to_string))
            .or_else(|| think.map(str::to_string)),
        is_irrelevant: is_irrelevant.as_bool().unwrap_or_default(),
        fields,
    })
}

fn required(obj: &Map<String, Value>, name: &str, field_type: FieldType) -> Result<Value, String> {
    optional(obj, name, field_type)?.ok_or_else(|| "is required".to_string())
}

fn optional(
    obj: &Map<String, Value>,
    name: &str,
    field_type: FieldType,
) -> Result<Option<Value>, String> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => field_type.coerce(value).map(Some),
    }
}
