use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Embedded relations come back as an object or as an array depending on
/// how the backend infers cardinality. Collapse both to at most one value.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(OneOrMany::One(item)) => Some(item),
        Some(OneOrMany::Many(items)) => items.into_iter().next(),
    })
}

pub fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// First human-readable message in a backend error body. The REST, storage
/// and auth services disagree on the field name.
pub fn error_message(body: &Value) -> Option<String> {
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
