//! Provider response classification.
//!
//! Every provider reports failure differently: OpenAI puts a `code` in a JSON
//! error object, Gemini sends `API_KEY_INVALID` inside a 400, DashScope says
//! `Arrearage`, OpenRouter answers 402. The functions here reduce all of it to
//! one [`ErrorKind`] so the cascade never inspects a raw response.
//!
//! | Response | Kind |
//! |---|---|
//! | 401 / 403 | `AuthInvalid` |
//! | 402 | `QuotaExceeded` |
//! | 400 / 404 / 405 / 422 | `UnsupportedModel` (unless the body says auth or quota) |
//! | 429 | `QuotaExceeded` if the body names quota/billing, else `Transient` |
//! | 408 / 5xx / transport | `Transient` |
//! | 200 but empty, unparseable, filtered or refusal | `EmptyOrRefusal` |

use crate::error::ErrorKind;
use crate::prompts::is_refusal;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_AUTH_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(invalid[ _-]?(api[ _-]?)?key|incorrect api key|api key not valid|api_key_invalid|invalid x-api-key|authentication_error|unauthori[sz]ed|invalid authentication|permission[ _]denied)",
    )
    .unwrap()
});

static RE_QUOTA_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(insufficient[ _]quota|exceeded your current quota|quota|billing|credit|balance|arrearage|payment required|insufficient[ _]funds)",
    )
    .unwrap()
});

/// Classify a non-success HTTP response.
///
/// Must only be called for statuses outside 2xx.
pub fn classify_status(status: u16, body: &str) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthInvalid,
        402 => ErrorKind::QuotaExceeded,
        400 | 404 | 405 | 422 => {
            if RE_AUTH_HINT.is_match(body) {
                ErrorKind::AuthInvalid
            } else if RE_QUOTA_HINT.is_match(body) {
                ErrorKind::QuotaExceeded
            } else {
                ErrorKind::UnsupportedModel
            }
        }
        429 => {
            if RE_QUOTA_HINT.is_match(body) {
                ErrorKind::QuotaExceeded
            } else {
                ErrorKind::Transient
            }
        }
        408 => ErrorKind::Transient,
        s if s >= 500 => ErrorKind::Transient,
        // Other 4xx codes are request problems specific to this model call.
        s if (400..500).contains(&s) => ErrorKind::UnsupportedModel,
        _ => ErrorKind::Transient,
    }
}

/// Classify a transport failure (connect, TLS, timeout, body read).
pub fn classify_transport(_err: &reqwest::Error) -> ErrorKind {
    ErrorKind::Transient
}

/// Validate the text extracted from a 2xx response.
///
/// `None` means the body could not be parsed into a completion, or the
/// provider reported a content filter instead of text.
pub fn classify_content(text: Option<&str>) -> Result<String, ErrorKind> {
    match text {
        Some(t) if !t.trim().is_empty() && !is_refusal(t) => Ok(t.to_string()),
        _ => Err(ErrorKind::EmptyOrRefusal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let cases: &[(u16, &str, ErrorKind)] = &[
            (401, "", ErrorKind::AuthInvalid),
            (403, "forbidden", ErrorKind::AuthInvalid),
            (402, "", ErrorKind::QuotaExceeded),
            (400, r#"{"error":{"message":"model not supported"}}"#, ErrorKind::UnsupportedModel),
            (404, "The model `gpt-9` does not exist", ErrorKind::UnsupportedModel),
            (405, "", ErrorKind::UnsupportedModel),
            (422, "invalid image", ErrorKind::UnsupportedModel),
            (429, "Rate limit reached for requests", ErrorKind::Transient),
            (429, "You exceeded your current quota, please check your plan and billing details", ErrorKind::QuotaExceeded),
            (408, "", ErrorKind::Transient),
            (500, "", ErrorKind::Transient),
            (502, "bad gateway", ErrorKind::Transient),
            (503, "overloaded", ErrorKind::Transient),
            (529, "overloaded_error", ErrorKind::Transient),
        ];
        for (status, body, expected) in cases {
            assert_eq!(classify_status(*status, body), *expected, "status {status} body {body:?}");
        }
    }

    #[test]
    fn bad_request_naming_invalid_key_is_auth() {
        let gemini = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        assert_eq!(classify_status(400, gemini), ErrorKind::AuthInvalid);
    }

    #[test]
    fn bad_request_naming_arrears_is_quota() {
        let dashscope = r#"{"code":"Arrearage","message":"Access denied, please make sure your account is in good standing."}"#;
        assert_eq!(classify_status(400, dashscope), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn content_checks() {
        assert_eq!(classify_content(Some("投标总价 1,000元")), Ok("投标总价 1,000元".to_string()));
        assert_eq!(classify_content(Some("   \n")), Err(ErrorKind::EmptyOrRefusal));
        assert_eq!(classify_content(None), Err(ErrorKind::EmptyOrRefusal));
        assert_eq!(
            classify_content(Some("I'm sorry, I can't read this image.")),
            Err(ErrorKind::EmptyOrRefusal)
        );
    }
}
