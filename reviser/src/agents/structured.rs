//! Parsing of JSON replies for the structured stages (analyze, critique, classify).

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::classifier::parse_message_type;
use crate::core::state::FeedbackKind;

pub const REVIEW_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/review.schema.json"
));

pub const MESSAGE_TYPE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/message_type.schema.json"
));

/// Slice out the JSON object embedded in a model reply.
///
/// Models often wrap the object in a code fence or add a sentence around it;
/// everything outside the outermost braces is dropped.
pub fn extract_json_object(reply: &str) -> Result<&str> {
    let start = reply
        .find('{')
        .ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("reply contains an unterminated JSON object"))?;
    Ok(&reply[start..=end])
}

/// Parse a reply, validate it against `schema`, and deserialize it.
pub fn parse_structured<T: DeserializeOwned>(reply: &str, schema: &str) -> Result<T> {
    let raw = extract_json_object(reply)?;
    let value: Value = serde_json::from_str(raw).context("parse structured reply")?;
    validate_schema(schema, &value)?;
    let parsed = serde_json::from_value(value).context("deserialize structured reply")?;
    Ok(parsed)
}

fn validate_schema(schema: &str, value: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(schema).context("parse embedded schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "structured reply failed validation: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MessageTypeReply {
    message_type: String,
}

/// Parse a classifier reply into a [`FeedbackKind`].
pub fn parse_message_type_reply(reply: &str) -> Result<FeedbackKind> {
    let parsed: MessageTypeReply = parse_structured(reply, MESSAGE_TYPE_SCHEMA)?;
    parse_message_type(&parsed.message_type)
        .ok_or_else(|| anyhow!("unknown message_type {:?}", parsed.message_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{Grade, Review};

    #[test]
    fn parses_fenced_review() {
        let reply = "Here you go:\n```json\n{\"description\": \"Add comments.\", \"grade\": \"bad\"}\n```\n";
        let review: Review = parse_structured(reply, REVIEW_SCHEMA).expect("parse");
        assert_eq!(review, Review::new("Add comments.", Grade::Bad));
    }

    #[test]
    fn unknown_grade_string_is_bad() {
        let reply = r#"{"description": "ok", "grade": "GOOD-ish"}"#;
        let review: Review = parse_structured(reply, REVIEW_SCHEMA).expect("parse");
        assert_eq!(review.grade, Grade::Bad);
    }

    #[test]
    fn missing_field_fails_validation() {
        let err = parse_structured::<Review>(r#"{"grade": "good"}"#, REVIEW_SCHEMA)
            .expect_err("invalid");
        assert!(err.to_string().contains("failed validation"));
    }

    #[test]
    fn reply_without_object_is_an_error() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("} {").is_err());
    }

    #[test]
    fn message_type_reply_maps_to_kind() {
        let kind = parse_message_type_reply(r#"{"message_type": "compilation_error"}"#)
            .expect("parse");
        assert_eq!(kind, FeedbackKind::CompileError);
        assert!(parse_message_type_reply(r#"{"message_type": "weather"}"#).is_err());
    }
}
