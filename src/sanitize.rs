use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Fields hashed before storage; they are never rendered, so left verbatim.
const VERBATIM_KEYS: &[&str] = &["password"];

pub fn strip_tags(s: &str) -> String {
    lazy_static! {
        static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    }
    TAG_RE.replace_all(s, "").into_owned()
}

pub fn sanitize_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('<') {
                *s = strip_tags(s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => {
            for (k, item) in map.iter_mut() {
                if !VERBATIM_KEYS.contains(&k.as_str()) {
                    sanitize_value(item);
                }
            }
        }
        _ => {}
    }
}

/// JSON body extractor that strips HTML tags from every string before
/// deserializing. Bad bodies become a 400 with the usual error body.
pub struct SanitizedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for SanitizedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(mut value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        sanitize_value(&mut value);
        let inner = serde_json::from_value(value)
            .map_err(|e| AppError::validation(format!("invalid request body: {e}")))?;
        Ok(SanitizedJson(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_tags_recursively() {
        let mut v = json!({
            "first_name": "<b>Bob</b>",
            "about": "hi <script>alert(1)</script>there",
            "tags": ["<i>x</i>", 3],
            "password": "p<a>ss"
        });
        sanitize_value(&mut v);
        assert_eq!(v["first_name"], "Bob");
        assert_eq!(v["about"], "hi alert(1)there");
        assert_eq!(v["tags"][0], "x");
        assert_eq!(v["tags"][1], 3);
        assert_eq!(v["password"], "p<a>ss");
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(strip_tags("5 > 3 and fine"), "5 > 3 and fine");
    }
}
