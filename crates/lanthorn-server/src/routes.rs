//! HTTP route handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use lanthorn_openid::{
    DirectStatus, IncomingRequest, OpenIdResponse, ProviderError, RequestMethod,
};

use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// OpenID endpoint: hands every request under the mount to the engine
pub async fn openid(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, InternalError> {
    let method = match method {
        Method::GET => RequestMethod::Get,
        Method::POST => RequestMethod::Post,
        _ => RequestMethod::Other,
    };

    let params = match method {
        RequestMethod::Post => decode_params(&body),
        _ => decode_params(uri.query().unwrap_or_default().as_bytes()),
    };

    let path = uri
        .path()
        .strip_prefix(state.mount.trim_end_matches('/'))
        .unwrap_or("/")
        .to_string();

    let request = IncomingRequest::new(method, path, params)
        .with_secure(state.is_secure(&headers));
    let request = match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) => request.with_accept(accept),
        None => request,
    };

    let response = state.provider.handle(&request).await?;
    Ok(render(response))
}

/// Health check
pub async fn health() -> &'static str {
    "OK"
}

/// Decode an `application/x-www-form-urlencoded` body or query string
pub fn decode_params(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

/// Turn an engine outcome into an HTTP response
pub fn render(response: OpenIdResponse) -> Response {
    match response {
        OpenIdResponse::PassThrough => StatusCode::NOT_FOUND.into_response(),
        OpenIdResponse::Direct { status, body } => {
            let status = match status {
                DirectStatus::Ok => StatusCode::OK,
                DirectStatus::BadRequest => StatusCode::BAD_REQUEST,
            };
            (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
        }
        OpenIdResponse::Redirect { location } => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        OpenIdResponse::Document { content_type, body } => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        OpenIdResponse::NotAcceptable => StatusCode::NOT_ACCEPTABLE.into_response(),
        OpenIdResponse::BadRequest(message) => {
            (StatusCode::BAD_REQUEST, [(header::CONTENT_TYPE, TEXT_PLAIN)], message).into_response()
        }
    }
}

/// Store, crypto or hook failure inside the engine
#[derive(Debug)]
pub struct InternalError(pub ProviderError);

impl From<ProviderError> for InternalError {
    fn from(err: ProviderError) -> Self {
        Self(err)
    }
}

impl IntoResponse for InternalError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "OpenID request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, TEXT_PLAIN)],
            self.0.to_string(),
        )
            .into_response()
    }
}
