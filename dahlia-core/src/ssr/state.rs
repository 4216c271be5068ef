//! State payload.
//!
//! Server-computed values travel to the client as one JSON object in a
//! `<script type="application/json" data-dh-state>` element. Values JSON
//! cannot express directly are tagged with single-key objects:
//!
//! | Value       | Encoding                      |
//! |-------------|-------------------------------|
//! | big integer | `{"$bigint": "<digits>"}`     |
//! | date        | `{"$date": <ms since epoch>}` |
//! | set         | `{"$set": [..]}`              |
//! | map         | `{"$map": [[key, value], ..]}`|
//!
//! Keys of nested objects that start with `$` get one more `$` so a plain
//! object can never read back as a tagged value.
//!
//! Functions and symbols cannot be serialized and are rejected with the path
//! of the offending value. `<` is escaped so the payload cannot close its
//! script element.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::dom::{Document, DomId, NodeType};
use crate::error::{Error, Result};

use super::RenderOptions;

/// A state entry.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    BigInt(i128),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Array(Vec<StateValue>),
    Object(IndexMap<String, StateValue>),
    Set(Vec<StateValue>),
    Map(Vec<(StateValue, StateValue)>),
    /// A live callback, named for error reporting. Never serializable.
    Function(String),
    /// A unique symbol, named for error reporting. Never serializable.
    Symbol(String),
}

/// The full state object.
pub type State = IndexMap<String, StateValue>;

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<StateValue>> From<Vec<T>> for StateValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Serialize `state` for embedding. Returns `Ok(None)` when there is nothing
/// to embed.
pub fn serialize_state(state: &State) -> Result<Option<String>> {
    if state.is_empty() {
        return Ok(None);
    }
    let mut object = Map::new();
    for (key, value) in state {
        object.insert(key.clone(), encode(value, key)?);
    }
    let json = serde_json::to_string(&Value::Object(object))
        .map_err(|err| Error::computation(format!("state encoding failed: {err}")))?;
    Ok(Some(json.replace('<', "\\u003c")))
}

fn encode(value: &StateValue, path: &str) -> Result<Value> {
    Ok(match value {
        StateValue::Null => Value::Null,
        StateValue::Bool(value) => Value::Bool(*value),
        StateValue::Number(number) => Value::Number(Number::from_f64(*number).ok_or_else(|| {
            Error::NonSerializableState {
                path: path.to_string(),
                kind: "non-finite number",
            }
        })?),
        StateValue::String(text) => Value::String(text.clone()),
        StateValue::BigInt(value) => tagged("$bigint", Value::String(value.to_string())),
        StateValue::Date(ms) => tagged("$date", Value::from(*ms)),
        StateValue::Array(items) => Value::Array(encode_items(items, path)?),
        StateValue::Set(items) => tagged("$set", Value::Array(encode_items(items, path)?)),
        StateValue::Map(entries) => {
            let pairs = entries
                .iter()
                .enumerate()
                .map(|(index, (key, value))| {
                    let path = format!("{path}[{index}]");
                    Ok(Value::Array(vec![
                        encode(key, &format!("{path}.key"))?,
                        encode(value, &format!("{path}.value"))?,
                    ]))
                })
                .collect::<Result<Vec<_>>>()?;
            tagged("$map", Value::Array(pairs))
        }
        StateValue::Object(fields) => {
            let mut object = Map::new();
            for (key, value) in fields {
                object.insert(escape_key(key), encode(value, &format!("{path}.{key}"))?);
            }
            Value::Object(object)
        }
        StateValue::Function(_) => {
            return Err(Error::NonSerializableState {
                path: path.to_string(),
                kind: "function",
            })
        }
        StateValue::Symbol(_) => {
            return Err(Error::NonSerializableState {
                path: path.to_string(),
                kind: "symbol",
            })
        }
    })
}

fn encode_items(items: &[StateValue], path: &str) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| encode(item, &format!("{path}[{index}]")))
        .collect()
}

fn escape_key(key: &str) -> String {
    if key.starts_with('$') {
        format!("${key}")
    } else {
        key.to_string()
    }
}

fn unescape_key(key: String) -> String {
    match key.strip_prefix('$') {
        Some(rest) => rest.to_string(),
        None => key,
    }
}

fn tagged(tag: &str, value: Value) -> Value {
    let mut object = Map::new();
    object.insert(tag.to_string(), value);
    Value::Object(object)
}

/// Parse a payload produced by [`serialize_state`].
pub fn parse_state(payload: &str) -> Result<State> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| Error::parse(err.column(), format!("invalid state payload: {err}")))?;
    match value {
        Value::Object(object) => object
            .into_iter()
            .map(|(key, value)| Ok((key, decode(value)?)))
            .collect(),
        _ => Err(Error::parse(0, "state payload is not an object")),
    }
}

fn decode(value: Value) -> Result<StateValue> {
    Ok(match value {
        Value::Null => StateValue::Null,
        Value::Bool(value) => StateValue::Bool(value),
        Value::Number(number) => StateValue::Number(
            number
                .as_f64()
                .ok_or_else(|| Error::parse(0, format!("number {number} out of range")))?,
        ),
        Value::String(text) => StateValue::String(text),
        Value::Array(items) => StateValue::Array(decode_items(items)?),
        Value::Object(object) => {
            let mut entries = object.into_iter();
            match (entries.next(), entries.next()) {
                (Some((key, value)), None) => decode_single(key, value)?,
                (first, second) => StateValue::Object(
                    first
                        .into_iter()
                        .chain(second)
                        .chain(entries)
                        .map(|(key, value)| Ok((unescape_key(key), decode(value)?)))
                        .collect::<Result<_>>()?,
                ),
            }
        }
    })
}

/// A one-key object is either a tagged value or a plain object.
fn decode_single(key: String, value: Value) -> Result<StateValue> {
    Ok(match (key.as_str(), value) {
        ("$bigint", Value::String(digits)) => StateValue::BigInt(
            digits
                .parse()
                .map_err(|_| Error::parse(0, format!("invalid big integer `{digits}`")))?,
        ),
        ("$date", Value::Number(ms)) => StateValue::Date(
            ms.as_i64()
                .ok_or_else(|| Error::parse(0, format!("invalid date `{ms}`")))?,
        ),
        ("$set", Value::Array(items)) => StateValue::Set(decode_items(items)?),
        ("$map", Value::Array(items)) => StateValue::Map(
            items
                .into_iter()
                .map(decode_pair)
                .collect::<Result<Vec<_>>>()?,
        ),
        (_, value) => {
            let mut fields = IndexMap::new();
            fields.insert(unescape_key(key), decode(value)?);
            StateValue::Object(fields)
        }
    })
}

fn decode_pair(pair: Value) -> Result<(StateValue, StateValue)> {
    match pair {
        Value::Array(mut pair) if pair.len() == 2 => {
            let value = pair.pop().unwrap_or(Value::Null);
            let key = pair.pop().unwrap_or(Value::Null);
            Ok((decode(key)?, decode(value)?))
        }
        other => Err(Error::parse(0, format!("invalid map entry {other}"))),
    }
}

fn decode_items(items: Vec<Value>) -> Result<Vec<StateValue>> {
    items.into_iter().map(decode).collect()
}

/// Find the state script under `root` and parse it.
///
/// Returns `Ok(None)` when the markup carries no state.
pub fn extract_state(document: &Document, root: DomId) -> Result<Option<State>> {
    extract_state_with(document, root, &RenderOptions::default())
}

pub fn extract_state_with(document: &Document, root: DomId, options: &RenderOptions) -> Result<Option<State>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if document.node_type(node) == Some(NodeType::Element)
            && document.tag_name(node).as_deref() == Some("script")
            && document.has_attribute(node, &options.state_attribute)
        {
            return parse_state(&document.text_content(node)).map(Some);
        }
        stack.extend(document.children(node).into_iter().rev());
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> State {
        let mut user = IndexMap::new();
        user.insert("name".to_string(), StateValue::from("Ada"));
        user.insert("tags".to_string(), StateValue::from(vec!["a", "b"]));

        let mut state = State::new();
        state.insert("user".to_string(), StateValue::Object(user));
        state.insert("count".to_string(), StateValue::from(3));
        state.insert("big".to_string(), StateValue::BigInt(1 << 80));
        state.insert("at".to_string(), StateValue::Date(1_700_000_000_000));
        state.insert(
            "seen".to_string(),
            StateValue::Set(vec![StateValue::from(1), StateValue::from(2)]),
        );
        state.insert(
            "lookup".to_string(),
            StateValue::Map(vec![(StateValue::from("k"), StateValue::Null)]),
        );
        state
    }

    #[test]
    fn empty_state_serializes_to_nothing() {
        assert_eq!(serialize_state(&State::new()).unwrap(), None);
    }

    #[test]
    fn tagged_values_survive_the_trip() {
        let state = sample();
        let payload = serialize_state(&state).unwrap().unwrap();
        assert!(payload.contains(r#""big":{"$bigint":"1208925819614629174706176"}"#));
        assert!(payload.contains(r#""at":{"$date":1700000000000}"#));
        assert_eq!(parse_state(&payload).unwrap(), state);
    }

    #[test]
    fn functions_are_rejected_with_their_path() {
        let mut handlers = IndexMap::new();
        handlers.insert(
            "onSave".to_string(),
            StateValue::Function("save".to_string()),
        );
        let mut state = State::new();
        state.insert(
            "form".to_string(),
            StateValue::Array(vec![StateValue::Null, StateValue::Object(handlers)]),
        );

        assert_eq!(
            serialize_state(&state).unwrap_err(),
            Error::NonSerializableState {
                path: "form[1].onSave".to_string(),
                kind: "function",
            }
        );
    }

    #[test]
    fn symbols_are_rejected() {
        let mut state = State::new();
        state.insert("id".to_string(), StateValue::Symbol("secret".to_string()));
        assert!(matches!(
            serialize_state(&state),
            Err(Error::NonSerializableState { kind: "symbol", .. })
        ));
    }

    #[test]
    fn payload_cannot_close_its_script() {
        let mut state = State::new();
        state.insert("html".to_string(), StateValue::from("</script><b>"));
        let payload = serialize_state(&state).unwrap().unwrap();

        assert!(!payload.contains('<'));
        assert_eq!(parse_state(&payload).unwrap(), state);
    }

    #[test]
    fn dollar_keys_stay_plain_objects() {
        let mut state = State::new();
        for tag in ["$set", "$map", "$date", "$bigint", "$$x", "$"] {
            let mut fields = IndexMap::new();
            fields.insert(tag.to_string(), StateValue::from(vec![1]));
            state.insert(tag.to_string(), StateValue::Object(fields));
        }
        let payload = serialize_state(&state).unwrap().unwrap();

        assert!(payload.contains(r#""$set":{"$$set":[1.0]}"#));
        assert_eq!(parse_state(&payload).unwrap(), state);
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        assert!(matches!(parse_state("{"), Err(Error::Parse { .. })));
        assert!(matches!(parse_state("[1]"), Err(Error::Parse { .. })));
    }
}
