//! Tolerant mapping of model output onto a declared set of keys
//!
//! Models are asked for JSON but do not always answer with it. [`coerce`]
//! never fails: every declared key is present in the result, filled from the
//! model output when it can be, and defaulted otherwise.

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Shape of one declared field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Plain string, defaults to ""
    Text,
    /// Array of anything, defaults to []
    List,
    /// Array of objects; bare entries become `{fallback_key: entry}`
    Records { fallback_key: String },
    /// Object with the given default
    Object(Value),
}

impl FieldKind {
    fn default_value(&self) -> Value {
        match self {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::List | FieldKind::Records { .. } => Value::Array(Vec::new()),
            FieldKind::Object(default) => default.clone(),
        }
    }

    fn is_list_like(&self) -> bool {
        matches!(self, FieldKind::List | FieldKind::Records { .. })
    }
}

/// One declared output key
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn list(name: &str) -> Self {
        Self::new(name, FieldKind::List)
    }

    pub fn records(name: &str, fallback_key: &str) -> Self {
        Self::new(
            name,
            FieldKind::Records {
                fallback_key: fallback_key.to_string(),
            },
        )
    }

    pub fn object(name: &str, default: Value) -> Self {
        Self::new(name, FieldKind::Object(default))
    }

    /// Accept `alias` in place of the canonical name
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            kind,
        }
    }

    /// First of canonical key and aliases holding a non-empty value, else the
    /// first non-null one
    fn lookup<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a Value> {
        let mut present = std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .filter_map(|key| object.get(key))
            .filter(|value| !value.is_null());
        let first = present.next()?;
        if !is_empty(first) {
            return Some(first);
        }
        Some(present.find(|value| !is_empty(value)).unwrap_or(first))
    }
}

/// Declared keys of a structured response
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Field that receives the raw text when nothing parses
    pub primary_key: String,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// The primary key must name one of `fields`
    pub fn new(primary_key: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            primary_key: primary_key.to_string(),
            fields,
        }
    }

    fn primary(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == self.primary_key)
    }

    fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.kind.default_value()))
            .collect()
    }
}

/// Map raw model output onto `schema`
pub fn coerce(raw: &str, schema: &Schema) -> Map<String, Value> {
    match parse_value(raw) {
        Some(Value::Object(object)) => schema
            .fields
            .iter()
            .map(|field| {
                let value = match field.lookup(&object) {
                    Some(value) => repair(&field.kind, value.clone()),
                    None => field.kind.default_value(),
                };
                (field.name.clone(), value)
            })
            .collect(),
        Some(Value::Array(items)) if schema.primary().is_some_and(|f| f.kind.is_list_like()) => {
            debug!("Model answered with a bare array, using it as '{}'", schema.primary_key);
            with_primary(schema, Value::Array(items))
        }
        Some(Value::String(text)) => {
            debug!("Model answered with a bare string, using it as '{}'", schema.primary_key);
            primary_text(schema, &text)
        }
        _ => {
            warn!("Model output is not a JSON object, keeping raw text under '{}'", schema.primary_key);
            primary_text(schema, raw)
        }
    }
}

fn primary_text(schema: &Schema, raw: &str) -> Map<String, Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        schema.defaults()
    } else {
        with_primary(schema, Value::String(raw.to_string()))
    }
}

fn with_primary(schema: &Schema, value: Value) -> Map<String, Value> {
    let mut result = schema.defaults();
    if let Some(field) = schema.primary() {
        result.insert(field.name.clone(), repair(&field.kind, value));
    }
    result
}

/// Whole text, then the outermost `{...}` or `[...]`, whichever opens first
fn parse_value(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    let object = || enclosed(raw, '{', '}').and_then(|slice| serde_json::from_str::<Value>(slice).ok());
    let array = || enclosed(raw, '[', ']').and_then(|slice| serde_json::from_str::<Value>(slice).ok());
    match (raw.find('{'), raw.find('[')) {
        (Some(brace), Some(bracket)) if bracket < brace => array().or_else(object),
        _ => object().or_else(array),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn enclosed(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then_some(&raw[start..=end])
}

fn repair(kind: &FieldKind, value: Value) -> Value {
    match kind {
        FieldKind::Text => match value {
            Value::String(_) => value,
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string()),
        },
        FieldKind::List => match value {
            Value::Array(_) => value,
            Value::Null => Value::Array(Vec::new()),
            Value::String(text) if text.trim().is_empty() => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        },
        FieldKind::Records { fallback_key } => {
            let entries = match value {
                Value::Array(entries) => entries,
                other => vec![other],
            };
            Value::Array(
                entries
                    .into_iter()
                    .filter_map(|entry| to_record(entry, fallback_key))
                    .collect(),
            )
        }
        FieldKind::Object(default) => match value {
            Value::Object(_) => value,
            _ => default.clone(),
        },
    }
}

fn to_record(entry: Value, fallback_key: &str) -> Option<Value> {
    let text = match entry {
        Value::Object(_) => return Some(entry),
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        return None;
    }
    let mut record = Map::new();
    record.insert(fallback_key.to_string(), Value::String(text));
    Some(Value::Object(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_schema() -> Schema {
        Schema::new(
            "summary",
            vec![
                FieldSpec::text("summary"),
                FieldSpec::list("concept_map").alias("conceptMap"),
            ],
        )
    }

    fn cards_schema() -> Schema {
        Schema::new("flashcards", vec![FieldSpec::records("flashcards", "question").alias("cards")])
    }

    #[test]
    fn test_missing_key_gets_default() {
        let result = coerce(r#"{"summary": "ok"}"#, &summary_schema());
        assert_eq!(Value::Object(result), json!({"summary": "ok", "concept_map": []}));
    }

    #[test]
    fn test_alias_fills_canonical_key() {
        let result = coerce(r#"{"summary": "ok", "conceptMap": ["cell", "nucleus"]}"#, &summary_schema());
        assert_eq!(result["concept_map"], json!(["cell", "nucleus"]));
        assert!(!result.contains_key("conceptMap"));
    }

    #[test]
    fn test_canonical_key_wins_unless_null() {
        let both = r#"{"summary": "", "concept_map": ["a"], "conceptMap": ["b"]}"#;
        assert_eq!(coerce(both, &summary_schema())["concept_map"], json!(["a"]));

        let null_canonical = r#"{"summary": "", "concept_map": null, "conceptMap": ["b"]}"#;
        assert_eq!(coerce(null_canonical, &summary_schema())["concept_map"], json!(["b"]));
    }

    #[test]
    fn test_empty_canonical_falls_through_to_alias() {
        let raw = r#"{"summary": "ok", "concept_map": [], "conceptMap": ["cell"]}"#;
        assert_eq!(coerce(raw, &summary_schema())["concept_map"], json!(["cell"]));

        let both_empty = r#"{"summary": "ok", "concept_map": [], "conceptMap": []}"#;
        assert_eq!(coerce(both_empty, &summary_schema())["concept_map"], json!([]));
    }

    #[test]
    fn test_bare_json_string_is_unquoted() {
        let result = coerce(r#"  "Osmosis moves water."  "#, &summary_schema());
        assert_eq!(result["summary"], json!("Osmosis moves water."));
        assert_eq!(result["concept_map"], json!([]));
    }

    #[test]
    fn test_non_json_keeps_raw_text() {
        let result = coerce("Mitochondria make ATP.", &summary_schema());
        assert_eq!(result["summary"], json!("Mitochondria make ATP."));
        assert_eq!(result["concept_map"], json!([]));

        let empty = coerce("   ", &summary_schema());
        assert_eq!(Value::Object(empty), json!({"summary": "", "concept_map": []}));
    }

    #[test]
    fn test_object_inside_prose_and_fences() {
        let raw = "Here you go:\n```json\n{\"summary\": \"fenced\"}\n```\nGood luck!";
        assert_eq!(coerce(raw, &summary_schema())["summary"], json!("fenced"));
    }

    #[test]
    fn test_records_wrap_bare_entries_and_skip_blank_ones() {
        let raw = r#"{"cards": ["  What is ATP?  ", "   ", {"question": "Q", "answer": "A"}, null, 42]}"#;
        let result = coerce(raw, &cards_schema());
        assert_eq!(
            result["flashcards"],
            json!([
                {"question": "What is ATP?"},
                {"question": "Q", "answer": "A"},
                {"question": "42"}
            ])
        );
    }

    #[test]
    fn test_bare_array_goes_to_list_primary() {
        let raw = "```\n[{\"question\": \"Q1\"}, \"Q2\"]\n```";
        let result = coerce(raw, &cards_schema());
        assert_eq!(result["flashcards"], json!([{"question": "Q1"}, {"question": "Q2"}]));

        // text primary cannot take an array, so the raw text is kept
        let result = coerce(r#"["a", "b"]"#, &summary_schema());
        assert_eq!(result["summary"], json!(r#"["a", "b"]"#));
    }

    #[test]
    fn test_type_repair() {
        let schema = Schema::new(
            "summary",
            vec![
                FieldSpec::text("summary"),
                FieldSpec::list("concept_map"),
                FieldSpec::object("progress", json!({"completion": 0.0})),
            ],
        );
        let result = coerce(
            r#"{"summary": 3.5, "concept_map": "photosynthesis", "progress": "half", "extra": true}"#,
            &schema,
        );
        assert_eq!(
            Value::Object(result),
            json!({"summary": "3.5", "concept_map": ["photosynthesis"], "progress": {"completion": 0.0}})
        );
    }
}
