use std::borrow::Cow;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sentry::protocol::{Event, Map, Request as SentryRequest, Value};

const REDACTED: &str = "[REDACTED]";

/// Field names that may carry the API key
const SENSITIVE_FIELDS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
];

/// `key=...` query parameters, as used by media download links
static KEY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)((?:^|[?&])key=)[^&\s"']+"#).expect("valid key param regex"));

/// `x-goog-api-key: ...` inside debug-formatted headers
static KEY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(x-goog-api-key"?\s*[:=]\s*"?)[^\s"',}]+"#).expect("valid key header regex")
});

fn is_sensitive_field(field_name: &str) -> bool {
    let field_lower = field_name.to_lowercase();
    field_lower == "key"
        || SENSITIVE_FIELDS
            .iter()
            .any(|sensitive| field_lower.contains(sensitive))
}

/// Replaces credential values embedded in free text
fn redact(text: &str) -> Cow<'_, str> {
    let replacement = format!("${{1}}{REDACTED}");
    match KEY_PARAM.replace_all(text, replacement.as_str()) {
        Cow::Borrowed(_) => KEY_HEADER.replace_all(text, replacement.as_str()),
        Cow::Owned(partial) => Cow::Owned(
            KEY_HEADER
                .replace_all(&partial, replacement.as_str())
                .into_owned(),
        ),
    }
}

fn redact_in_place(text: &mut String) {
    if let Cow::Owned(redacted) = redact(text) {
        *text = redacted;
    }
}

fn scrub_map(map: &mut Map<String, Value>) {
    map.retain(|key, _| !is_sensitive_field(key));
    for value in map.values_mut() {
        if let Value::String(text) = value {
            redact_in_place(text);
        }
    }
}

fn scrub_request(request: &mut SentryRequest) {
    for (name, value) in request.headers.iter_mut() {
        if is_sensitive_field(name) {
            *value = REDACTED.to_string();
        }
    }

    if let Some(query_string) = request.query_string.as_mut() {
        redact_in_place(query_string);
    }

    if let Some(data) = request.data.as_mut() {
        redact_in_place(data);
    }
}

/// Strips the API key from events before they leave the process
pub fn scrub_sensitive_data(mut event: Event<'static>) -> Option<Event<'static>> {
    if let Some(request) = event.request.as_mut() {
        scrub_request(request);
    }

    if let Some(message) = event.message.as_mut() {
        redact_in_place(message);
    }

    for exception in event.exception.values.iter_mut() {
        if let Some(value) = exception.value.as_mut() {
            redact_in_place(value);
        }
    }

    scrub_map(&mut event.extra);

    for context in event.contexts.values_mut() {
        if let sentry::protocol::Context::Other(map) = context {
            scrub_map(map);
        }
    }

    for breadcrumb in event.breadcrumbs.values.iter_mut() {
        if let Some(message) = breadcrumb.message.as_mut() {
            redact_in_place(message);
        }
        scrub_map(&mut breadcrumb.data);
    }

    Some(event)
}

pub fn create_before_send() -> Arc<dyn Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync>
{
    Arc::new(scrub_sensitive_data)
}
