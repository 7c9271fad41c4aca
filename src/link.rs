// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Turning relation links into request URLs.
//!
//! Templated links are expanded following RFC 6570 (all level 3 operators, plus the `*` and `:n`
//! modifiers). Parameters a template does not consume, and every parameter of a literal link, are
//! appended as a query string.

use crate::registry::ResourceType;
use crate::types::{GetOption, Link, PageParams, Params};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::HashSet;
use url::form_urlencoded;

// Everything outside `ALPHA / DIGIT / "-" / "." / "_" / "~"` is encoded.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// The `+` and `#` operators additionally pass the reserved set through.
const UNRESERVED_AND_RESERVED: &AsciiSet = &UNRESERVED
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=');

struct Operator {
    first: &'static str,
    sep: &'static str,
    named: bool,
    if_empty: &'static str,
    allow_reserved: bool,
}

const fn op(
    first: &'static str,
    sep: &'static str,
    named: bool,
    if_empty: &'static str,
    allow_reserved: bool,
) -> Operator {
    Operator {
        first,
        sep,
        named,
        if_empty,
        allow_reserved,
    }
}

impl Operator {
    fn parse(expression: &str) -> (Self, &str) {
        match expression.chars().next() {
            Some('+') => (op("", ",", false, "", true), &expression[1..]),
            Some('#') => (op("#", ",", false, "", true), &expression[1..]),
            Some('.') => (op(".", ".", false, "", false), &expression[1..]),
            Some('/') => (op("/", "/", false, "", false), &expression[1..]),
            Some(';') => (op(";", ";", true, "", false), &expression[1..]),
            Some('?') => (op("?", "&", true, "=", false), &expression[1..]),
            Some('&') => (op("&", "&", true, "=", false), &expression[1..]),
            _ => (op("", ",", false, "", false), expression),
        }
    }
}

fn encode(value: &str, allow_reserved: bool) -> String {
    if !allow_reserved {
        return utf8_percent_encode(value, UNRESERVED).to_string();
    }
    // Reserved expansion keeps existing pct-encoded triplets; a lone `%` is still encoded.
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        out.extend(utf8_percent_encode(&rest[..pos], UNRESERVED_AND_RESERVED));
        let tail = &rest[pos..];
        let bytes = tail.as_bytes();
        if bytes.len() >= 3 && bytes[1].is_ascii_hexdigit() && bytes[2].is_ascii_hexdigit() {
            out.push_str(&tail[..3]);
            rest = &tail[3..];
        } else {
            out.push_str("%25");
            rest = &tail[1..];
        }
    }
    out.extend(utf8_percent_encode(rest, UNRESERVED_AND_RESERVED));
    out
}

/// String form of a parameter value: objects become JSON, arrays join their items with commas.
pub fn param_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(param_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Query pairs for `params`. Nulls are skipped and arrays repeat the key for every item.
pub fn query_pairs<'a>(
    params: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => pairs.extend(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| (name.clone(), param_to_string(item))),
            ),
            other => pairs.push((name.clone(), param_to_string(other))),
        }
    }
    pairs
}

fn expand_expression(expression: &str, params: &Params, consumed: &mut HashSet<String>) -> String {
    let (op, variables) = Operator::parse(expression);
    let mut parts = Vec::new();
    for varspec in variables.split(',') {
        let (varspec, explode) = match varspec.strip_suffix('*') {
            Some(name) => (name, true),
            None => (varspec, false),
        };
        let (name, prefix) = match varspec.split_once(':') {
            Some((name, len)) => (name, len.parse::<usize>().ok()),
            None => (varspec, None),
        };
        let value = match params.get(name) {
            Some(value) => {
                consumed.insert(name.to_string());
                value
            }
            None => continue,
        };
        let part = match value {
            Value::Null => continue,
            Value::Array(items) => {
                let items: Vec<String> = items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| encode(&param_to_string(item), op.allow_reserved))
                    .collect();
                if items.is_empty() {
                    continue;
                }
                if explode && op.named {
                    items
                        .iter()
                        .map(|item| format!("{}={}", name, item))
                        .collect::<Vec<_>>()
                        .join(op.sep)
                } else if explode {
                    items.join(op.sep)
                } else if op.named {
                    format!("{}={}", name, items.join(","))
                } else {
                    items.join(",")
                }
            }
            scalar => {
                let mut raw = param_to_string(scalar);
                if let Some(len) = prefix {
                    raw = raw.chars().take(len).collect();
                }
                let encoded = encode(&raw, op.allow_reserved);
                if !op.named {
                    encoded
                } else if encoded.is_empty() {
                    format!("{}{}", name, op.if_empty)
                } else {
                    format!("{}={}", name, encoded)
                }
            }
        };
        parts.push(part);
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{}{}", op.first, parts.join(op.sep))
    }
}

/// Expand the `{...}` expressions of `template`, returning the URL and the names consumed.
///
/// An opening brace without a matching close is copied through literally.
fn expand_template(template: &str, params: &Params) -> (String, HashSet<String>) {
    let mut consumed = HashSet::new();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                let expression = &rest[open + 1..open + close];
                out.push_str(&expand_expression(expression, params, &mut consumed));
                rest = &rest[open + close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, consumed)
}

/// Append `pairs` to the query of `url`, ahead of any fragment.
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let sep = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    match fragment {
        Some(fragment) => format!("{}{}{}#{}", base, sep, query, fragment),
        None => format!("{}{}{}", base, sep, query),
    }
}

/// Split a link and its parameters into the request URL and the query pairs still to be sent.
///
/// For a templated link, the template consumes the parameters it names and only the remainder is
/// returned as query pairs. For a literal link the href is used as is and every parameter is
/// returned.
pub fn resolve(link: &Link, params: &Params) -> (String, Vec<(String, String)>) {
    if link.templated {
        let (url, consumed) = expand_template(&link.href, params);
        let remaining = query_pairs(params.iter().filter(|(name, _)| !consumed.contains(*name)));
        (url, remaining)
    } else {
        (link.href.clone(), query_pairs(params))
    }
}

/// Expand `link` against `params` into a single literal URL.
pub fn expand(link: &Link, params: &Params) -> String {
    let (url, pairs) = resolve(link, params);
    append_query(&url, &pairs)
}

/// Options with the default page filled in when the caller gave none.
///
/// The caller's options are never modified; a new value is returned.
pub fn fill_default_page(options: Option<&GetOption>, defaults: PageParams) -> GetOption {
    let mut options = options.cloned().unwrap_or_default();
    let explicit = options.params.contains_key("page") || options.params.contains_key("size");
    if options.page.is_none() && !explicit {
        options.page = Some(defaults);
    }
    options
}

/// Options carrying the projection name of `resource_type`, when it is a projection.
///
/// The projection of the type replaces any `projection` param the caller supplied. Options of a
/// type without a projection name pass through unchanged.
pub fn fill_projection_name(
    resource_type: Option<&ResourceType>,
    options: Option<&GetOption>,
) -> Option<GetOption> {
    match resource_type.and_then(ResourceType::projection_name) {
        Some(projection) => {
            let options = options.cloned().unwrap_or_default();
            Some(options.with_param("projection", projection))
        }
        None => options.cloned(),
    }
}

/// `{base}/{resource_name}` followed by `query`, which may be a path, query or fragment suffix.
pub fn generate_resource_url(base_url: &str, resource_name: &str, query: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        resource_name.trim_matches('/')
    );
    match query {
        Some(query) if !query.is_empty() => {
            if !query.starts_with(|c| c == '/' || c == '?' || c == '#') {
                url.push('/');
            }
            url.push_str(query);
        }
        _ => {}
    }
    url
}

/// Non-empty path segments of `href`, ignoring query, fragment and any template suffix.
pub fn path_segments(href: &str) -> Vec<String> {
    let href = href.split(|c| c == '{' || c == '?' || c == '#').next().unwrap_or("");
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}
