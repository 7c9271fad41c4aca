// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Flattening request bodies into their wire form.
//!
//! Any resource found in a body, at any depth, collapses to its `_links.self.href`. Bodies are
//! plain JSON by the time they get here, so dates have already been serialized to strings and
//! pass through as ordinary scalars.

use crate::classify;
use crate::error::HalError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{event, Level};

/// Which otherwise omitted values to keep in a resolved body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Include {
    NullValues,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestBody {
    pub body: Value,
    pub include: Option<Include>,
}

impl RequestBody {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            include: None,
        }
    }

    /// Serialize `body` (which may contain materialized resources) into a request body.
    pub fn from_serializable<T: Serialize>(body: &T) -> Result<Self, HalError> {
        let body = serde_json::to_value(body).map_err(|err| HalError::Validation {
            param: format!("requestBody ({})", err),
        })?;
        Ok(Self::new(body))
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = Some(include);
        self
    }

    fn includes_nulls(&self) -> bool {
        self.include == Some(Include::NullValues)
    }
}

/// The wire form of `request_body`, or `None` when there is nothing to send.
///
/// A missing body, a `null` body and an empty object all resolve to `None`. Scalars pass through.
/// Objects and arrays are walked recursively: resources become their self href and, unless
/// [Include::NullValues] is requested, `null` properties are dropped.
pub fn resolve_values(request_body: Option<&RequestBody>) -> Option<Value> {
    let request_body = request_body?;
    let include_nulls = request_body.includes_nulls();
    let resolved = match &request_body.body {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        body @ Value::Object(_) | body @ Value::Array(_) => Some(resolve(body, include_nulls)),
        scalar => Some(scalar.clone()),
    };
    event!(Level::DEBUG, "RESOLVE_VALUES result: {:?}", resolved);
    resolved
}

fn resolve(value: &Value, include_nulls: bool) -> Value {
    if let Some(href) = classify::self_href(value) {
        return Value::String(href.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, value)| include_nulls || !value.is_null())
                .map(|(key, value)| (key.clone(), resolve(value, include_nulls)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve(item, include_nulls))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
