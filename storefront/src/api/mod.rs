use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::store::{keys, or_empty_if_corrupt, Storage};

pub mod auth_api;
pub mod books_api;
pub mod orders_api;
pub mod users_api;

pub use auth_api::AuthApi;
pub use reqwest::StatusCode;

pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";
pub const NO_RESPONSE_MESSAGE: &str = "No response received from server";

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Every failure leaving the gateway is one of these three kinds.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Server { status: StatusCode, message: String },
    /// The request went out but nothing came back.
    #[error("No response received from server")]
    NoResponse(#[source] reqwest::Error),
    /// The request could not be built or its answer could not be read.
    #[error("{0}")]
    Request(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_builder() {
            ApiError::Request(error.to_string())
        } else {
            ApiError::NoResponse(error)
        }
    }
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: Option<String>,
    error: Option<String>,
}

/// Picks the human readable message out of an error body: `message`, then
/// `error`, then a generic fallback.
pub fn server_message(body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.message.or(payload.error))
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned())
}

/// Which bearer token a request carries.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// Whatever token the persisted store holds at send time.
    Stored,
    Token(&'a str),
}

/// The single outbound channel to the backend API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn Storage>,
}

impl ApiClient {
    pub fn new(base_url: &Url, storage: Arc<dyn Storage>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, storage)
    }

    pub fn with_http(http: reqwest::Client, base_url: &Url, storage: Arc<dyn Storage>) -> Self {
        Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            storage,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        auth: Auth<'_>,
    ) -> ApiResult<RequestBuilder> {
        let endpoint = self.endpoint(path);
        debug!(%method, %endpoint, "Api request");
        let request = self.http.request(method, endpoint);
        let token = match auth {
            Auth::Token(token) => Some(token.to_owned()),
            Auth::Stored => or_empty_if_corrupt(self.storage.get(keys::TOKEN), None)
                .map_err(|error| ApiError::Request(error.to_string()))?,
        };
        Ok(match token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        })
    }

    async fn dispatch(&self, request: RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = request.send().await.map_err(|error| {
            warn!(?error, "Api request got no response");
            ApiError::from_transport(error)
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = server_message(&body);
        warn!(%status, %url, %message, "Api request failed");
        Err(ApiError::Server { status, message })
    }

    pub(crate) async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        self.dispatch(request)
            .await?
            .json::<T>()
            .await
            .map_err(|error| ApiError::Request(format!("unexpected response body: {error}")))
    }

    /// Same as [`Self::execute`] but ignores the response body.
    pub(crate) async fn execute_empty(&self, request: RequestBuilder) -> ApiResult<()> {
        self.dispatch(request).await.map(|_| ())
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self.request(Method::GET, path, Auth::Stored)?;
        self.execute(request).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self.request(Method::DELETE, path, Auth::Stored)?;
        self.execute(request).await
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(method, path, Auth::Stored)?.json(body);
        self.execute(request).await
    }
}
