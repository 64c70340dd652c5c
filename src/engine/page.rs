// Page payloads and validation of the configured response shape.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FetchError;

/// One successfully fetched slice of server data.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64) -> Self {
        Self { items, total_count }
    }
}

/// Names of the response keys holding the data array and the total count.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    data_key: String,
    count_key: String,
}

impl ResponseShape {
    pub fn new(data_key: impl Into<String>, count_key: impl Into<String>) -> Self {
        Self {
            data_key: data_key.into(),
            count_key: count_key.into(),
        }
    }

    /// Validate `response` and decode it into a [`Page`].
    pub fn parse<T: DeserializeOwned>(&self, response: Value) -> Result<Page<T>, FetchError> {
        let Value::Object(mut object) = response else {
            return Err(FetchError::validation("response is not a JSON object"));
        };

        let total_count = match object.get(&self.count_key) {
            None => {
                return Err(FetchError::validation(format!(
                    "missing count key `{}`",
                    self.count_key
                )))
            }
            Some(value) => parse_count(value).ok_or_else(|| {
                FetchError::validation(format!(
                    "count key `{}` is not a non-negative integer: {}",
                    self.count_key, value
                ))
            })?,
        };

        let items = match object.remove(&self.data_key) {
            None => {
                return Err(FetchError::validation(format!(
                    "missing data key `{}`",
                    self.data_key
                )))
            }
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(FetchError::validation(format!(
                    "data key `{}` is not an array (got {})",
                    self.data_key,
                    json_type(&other)
                )))
            }
        };

        let items = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| FetchError::validation(format!("item {}: {}", i, e)))
            })
            .collect::<Result<Vec<T>, _>>()?;

        Ok(Page { items, total_count })
    }
}

fn parse_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    // Some servers serialize counts as floats (e.g. `5.0`).
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
