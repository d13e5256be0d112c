//! Engine outcomes, ready for the host to render as HTTP

use url::Url;

use crate::message::Message;
use crate::realm::is_web_url;

/// Status of a direct (key-value form) response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectStatus {
    Ok,
    BadRequest,
}

/// What the host should send back for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenIdResponse {
    /// Not an OpenID request; hand it to the host's next handler
    PassThrough,

    /// `text/plain` key-value form body
    Direct { status: DirectStatus, body: String },

    /// 302 redirect (indirect response, or a host login page)
    Redirect { location: String },

    /// Discovery document
    Document {
        content_type: &'static str,
        body: String,
    },

    /// 406: no acceptable discovery representation
    NotAcceptable,

    /// 400 with a plain-text reason, used when an indirect response has no
    /// usable `return_to` to redirect to
    BadRequest(String),
}

impl OpenIdResponse {
    /// Successful direct response
    pub fn direct(message: &Message) -> Self {
        OpenIdResponse::Direct {
            status: DirectStatus::Ok,
            body: message.encode_direct(None).body,
        }
    }

    /// Direct error response (HTTP 400)
    pub fn direct_error(message: &Message) -> Self {
        OpenIdResponse::Direct {
            status: DirectStatus::BadRequest,
            body: message.encode_direct(None).body,
        }
    }

    /// Direct error carrying only an `error` field
    pub fn direct_error_text(error: impl Into<String>) -> Self {
        let error: String = error.into();
        let message: Message = [("error", error)].into_iter().collect();
        Self::direct_error(&message)
    }

    /// Indirect response: redirect to `return_to` with the message appended
    /// to its query. Existing query parameters survive unless a response
    /// field overrides them.
    pub fn indirect(return_to: Option<&str>, message: &Message) -> Self {
        let Some(mut url) = return_to.and_then(parse_return_to) else {
            return OpenIdResponse::BadRequest("Invalid return_to parameter".to_string());
        };

        let pairs = message.to_query_pairs();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !pairs.iter().any(|(name, _)| name.as_str() == &**k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            query.extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        OpenIdResponse::Redirect {
            location: url.to_string(),
        }
    }

    /// Indirect error response (`mode=error`)
    pub fn indirect_error(return_to: Option<&str>, error: impl Into<String>) -> Self {
        let message: Message = [("mode", "error".to_string()), ("error", error.into())]
            .into_iter()
            .collect();
        Self::indirect(return_to, &message)
    }

    /// HTTP status code the host should use
    pub fn status_code(&self) -> u16 {
        match self {
            OpenIdResponse::PassThrough => 404,
            OpenIdResponse::Direct {
                status: DirectStatus::Ok,
                ..
            } => 200,
            OpenIdResponse::Direct {
                status: DirectStatus::BadRequest,
                ..
            } => 400,
            OpenIdResponse::Redirect { .. } => 302,
            OpenIdResponse::Document { .. } => 200,
            OpenIdResponse::NotAcceptable => 406,
            OpenIdResponse::BadRequest(_) => 400,
        }
    }

    /// Parse the fields of a direct or redirect response (handy for callers
    /// acting as a relying party, and for tests)
    pub fn fields(&self) -> Option<Message> {
        match self {
            OpenIdResponse::Direct { body, .. } => Some(Message::from_key_value_form(body)),
            OpenIdResponse::Redirect { location } => {
                let url = Url::parse(location).ok()?;
                Some(Message::from_parameters(url.query_pairs()))
            }
            _ => None,
        }
    }
}

pub(crate) fn parse_return_to(return_to: &str) -> Option<Url> {
    Url::parse(return_to).ok().filter(is_web_url)
}
