use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::store::plain;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("{method} {path} returned {status}: {message}")]
    Api {
        method: String,
        path: String,
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    #[error("{method} {path} failed: {message}")]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl SupabaseError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SupabaseError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when a row-level-security policy or the role's grants refused
    /// the request.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
            || self.code() == Some("42501")
            || self.api_message().contains("row-level security")
    }

    /// True when the relation itself is missing (`42P01`), which the access
    /// checks report separately from permission failures.
    pub fn is_missing_table(&self) -> bool {
        self.code() == Some("42P01") || self.api_message().contains("does not exist")
    }

    fn api_message(&self) -> &str {
        match self {
            SupabaseError::Api { message, .. } => message,
            _ => "",
        }
    }

    pub(crate) fn from_status(
        method: &str,
        path: &str,
        status: u16,
        response: ureq::Response,
    ) -> Self {
        let body = response.into_string().unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let (code, message, details, hint) = match parsed {
            Some(err) => (
                err.error_code.or_else(|| err.code.map(|code| plain(&code))),
                err.message
                    .or(err.msg)
                    .or(err.error_description)
                    .or(err.error)
                    .unwrap_or_else(|| body.clone()),
                err.details,
                err.hint,
            ),
            None => (None, body, None, None),
        };
        SupabaseError::Api {
            method: method.to_string(),
            path: path.to_string(),
            status,
            code,
            message,
            details,
            hint,
        }
    }
}

/// Error body shared by PostgREST (`code`/`message`) and GoTrue (`msg`,
/// `error_description`, numeric `code`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}
