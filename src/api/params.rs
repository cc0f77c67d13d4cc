//! Call parameter extraction.
//!
//! Form values (urlencoded body, then query string) are preferred. When the
//! request carries no form values at all, the raw body is decoded through
//! the configured codec. Path parameters captured by the URL pattern are
//! added last and never overwrite a key that is already present.

use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::error::GatewayError;
use crate::routing::PathParams;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Raw request pieces needed to build call params.
#[derive(Debug, Clone, Copy)]
pub struct RawParams<'a> {
    /// Query string without the leading `?`.
    pub query: Option<&'a str>,
    /// `Content-Type` header value.
    pub content_type: Option<&'a str>,
    /// Buffered request body.
    pub body: &'a [u8],
}

impl RawParams<'_> {
    fn is_form(&self) -> bool {
        self.content_type
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
    }
}

/// Builds the params value for one call.
///
/// # Errors
///
/// Returns [`GatewayError::Codec`] if the body fallback cannot be decoded.
pub fn collect_params(
    codec: &dyn Codec,
    raw: RawParams<'_>,
    path_params: PathParams,
) -> Result<Value, GatewayError> {
    let form_body = raw.is_form().then_some(raw.body);
    let form = form_values(form_body, raw.query);

    let mut params = if form.is_empty() {
        let body = if form_body.is_some() { &[][..] } else { raw.body };
        codec.decode(body)?
    } else {
        Value::Object(form)
    };

    if let Value::Object(map) = &mut params {
        for (name, value) in path_params {
            map.entry(name).or_insert(Value::String(value));
        }
    }
    Ok(params)
}

/// Parses urlencoded pairs from the form body and the query string.
///
/// Body values come before query values. A key seen once maps to a string;
/// a key seen more than once maps to an array in arrival order.
#[must_use]
pub fn form_values(body: Option<&[u8]>, query: Option<&str>) -> Map<String, Value> {
    let pairs = body
        .into_iter()
        .flat_map(url::form_urlencoded::parse)
        .chain(query.into_iter().flat_map(|q| url::form_urlencoded::parse(q.as_bytes())));

    let mut form = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match form.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                form.insert(key.into_owned(), value);
            }
        }
    }
    form
}
