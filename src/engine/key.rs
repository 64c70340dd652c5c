// Canonical request keys — order-independent identity of a page request.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::transport::traits::{FetchRequest, HttpMethod};

const PAGE_KEY: &str = "page";
const LIMIT_KEY: &str = "limit";

/// A primitive extra query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Query-string rendering; `None` for nullish values, which are dropped.
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Int(i) => Some(i.to_string()),
            ParamValue::Float(f) => Some(f.to_string()),
            ParamValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Identity of one page request. Two keys are equal iff every coordinate
/// is equal after parameter normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    pub method: HttpMethod,
    pub resource_locator: String,
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    /// Sorted, stringified, with nullish values and reserved keys removed.
    pub extra_params: BTreeMap<String, String>,
    /// Always `None` for GET.
    pub body: Option<Value>,
    search_key: String,
}

impl QueryKey {
    /// Full query-string parameter set: page, limit, search, then extras.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.extra_params.len() + 3);
        params.push((PAGE_KEY.to_string(), self.page.to_string()));
        params.push((LIMIT_KEY.to_string(), self.limit.to_string()));
        if let Some(search) = &self.search {
            params.push((self.search_key.clone(), search.clone()));
        }
        params.extend(
            self.extra_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        params
    }

    /// Deterministic cache key string.
    pub fn cache_key(&self) -> String {
        let mut params = self.query_params();
        params.sort();
        json!([
            self.method.as_str(),
            self.resource_locator,
            params,
            self.body
        ])
        .to_string()
    }

    pub fn to_request(&self) -> FetchRequest {
        FetchRequest {
            method: self.method,
            url: self.resource_locator.clone(),
            params: self.query_params(),
            body: self.body.clone(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} page={} limit={}",
            self.method, self.resource_locator, self.page, self.limit
        )?;
        if let Some(search) = &self.search {
            write!(f, " {}={:?}", self.search_key, search)?;
        }
        Ok(())
    }
}

/// Builds [`QueryKey`]s for one resource.
#[derive(Debug, Clone)]
pub struct RequestKeyBuilder {
    method: HttpMethod,
    resource_locator: String,
    search_key: String,
}

impl RequestKeyBuilder {
    pub fn new(
        method: HttpMethod,
        resource_locator: impl Into<String>,
        search_key: impl Into<String>,
    ) -> Self {
        Self {
            method,
            resource_locator: resource_locator.into(),
            search_key: search_key.into(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Whether `key` collides with a parameter the engine sets itself.
    pub fn is_reserved(&self, key: &str) -> bool {
        key == PAGE_KEY || key == LIMIT_KEY || key == self.search_key
    }

    pub fn build<'a, I, K>(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
        params: I,
        body: Option<&Value>,
    ) -> QueryKey
    where
        I: IntoIterator<Item = (K, &'a ParamValue)>,
        K: AsRef<str>,
    {
        let extra_params = params
            .into_iter()
            .filter(|(k, _)| !self.is_reserved(k.as_ref()))
            .filter_map(|(k, v)| v.render().map(|v| (k.as_ref().to_string(), v)))
            .collect();

        let body = match self.method {
            HttpMethod::Post => body.cloned(),
            HttpMethod::Get => None,
        };

        QueryKey {
            method: self.method,
            resource_locator: self.resource_locator.clone(),
            page,
            limit,
            search: search.filter(|s| !s.is_empty()).map(str::to_string),
            extra_params,
            body,
            search_key: self.search_key.clone(),
        }
    }
}
