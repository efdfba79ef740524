//! Response handling shared by the Supabase clients and the model endpoints.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::util::compact_text;
use crate::{Error, Result};

/// Error body shapes returned by PostgREST, GoTrue, and FastAPI
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    detail: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [
            self.message,
            self.msg,
            self.error_description,
            self.error,
            self.detail,
        ]
        .into_iter()
        .flatten()
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
    }
}

/// Render a failed response as `message (status)`.
pub(crate) fn api_error_message(status: StatusCode, body: &str) -> String {
    let code = status.as_u16();
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .or_else(|| Some(compact_text(body)).filter(|text| !text.is_empty()));
    match message {
        Some(message) => format!("{message} ({code})"),
        None => format!("HTTP {code}"),
    }
}

/// Map a non-success status to the failure taxonomy.
pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    let message = api_error_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::Validation(message)
        }
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Transport(message),
    }
}

/// Send `request` and decode a JSON body, mapping failures through
/// [`status_error`].
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|error| Error::Transport(error.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| Error::Transport(error.to_string()))?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    serde_json::from_str(&body).map_err(|error| Error::Schema(error.to_string()))
}
