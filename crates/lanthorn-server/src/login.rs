//! Demo login page for parked `checkid_setup` requests
//!
//! Any non-empty username is accepted. A real deployment would check
//! credentials here before calling `complete_auth`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use lanthorn_openid::{
    AttributeValue, AttributeValues, AuthContext, Authentication, FetchRequest, Realm,
};
use serde::Deserialize;

use crate::routes::{render, InternalError};
use crate::state::AppState;

/// HTML template for the login page
const LOGIN_TEMPLATE: &str = include_str!("../templates/login.html");

pub const AX_FRIENDLY_NAME: &str = "http://axschema.org/namePerson/friendly";
pub const AX_EMAIL: &str = "http://axschema.org/contact/email";
pub const AX_FULL_NAME: &str = "http://axschema.org/namePerson";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub session: String,
}

/// Login form submission. Exactly one of `login` / `cancel` is set,
/// depending on the button pressed.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub session: String,
    #[serde(default)]
    pub username: String,
    pub login: Option<String>,
    pub cancel: Option<String>,
}

/// Show the login form for a pending request
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Response {
    match state.sessions.get(&query.session).await {
        Some(context) => Html(render_page(&query.session, &context, None)).into_response(),
        None => unknown_session(),
    }
}

/// Complete or cancel a pending request
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, InternalError> {
    let username = form.username.trim();

    if form.cancel.is_none() && (form.login.is_none() || username.is_empty()) {
        let Some(context) = state.sessions.get(&form.session).await else {
            return Ok(unknown_session());
        };
        let page = render_page(&form.session, &context, Some("Please enter a username."));
        return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
    }

    let Some(context) = state.sessions.take(&form.session).await else {
        return Ok(unknown_session());
    };

    if form.cancel.is_some() {
        tracing::info!(session = %form.session, "Login cancelled");
        return Ok(render(state.provider.reject_auth(&context)));
    }

    tracing::info!(session = %form.session, username = %username, "Login accepted");
    let authentication = Authentication::new(username).with_attributes(demo_attributes(username));
    let response = state.provider.complete_auth(&context, authentication).await?;
    Ok(render(response))
}

/// Attributes released to relying parties that ask for them
pub fn demo_attributes(username: &str) -> AttributeValues {
    let mut attributes = AttributeValues::new();
    attributes.insert(AX_FRIENDLY_NAME.to_string(), AttributeValue::from(username));
    attributes.insert(
        AX_EMAIL.to_string(),
        AttributeValue::from(format!("{}@example.com", username)),
    );
    attributes.insert(AX_FULL_NAME.to_string(), AttributeValue::from(username));
    attributes
}

fn render_page(session: &str, context: &AuthContext, error: Option<&str>) -> String {
    let realm = context
        .realm()
        .or_else(|| context.return_to())
        .unwrap_or_default();
    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default();
    let attributes = context
        .ax
        .as_ref()
        .map(render_attributes)
        .unwrap_or_default();

    LOGIN_TEMPLATE
        .replace("{{REALM}}", &escape(&describe_realm(realm)))
        .replace("{{SESSION}}", &escape(session))
        .replace("{{ERROR}}", &error)
        .replace("{{ATTRIBUTES}}", &attributes)
}

/// `*.example.com` reads as "any site under example.com"
fn describe_realm(realm: &str) -> String {
    match Realm::parse(realm) {
        Ok(parsed) if parsed.is_wildcard() => format!("any site under {}", parsed.host()),
        _ => realm.to_string(),
    }
}

/// List the attributes the relying party asked for. Types declared but
/// named in neither `required` nor `if_available` are not shown.
fn render_attributes(request: &FetchRequest) -> String {
    let items: Vec<String> = request
        .requested_types()
        .filter_map(|type_uri| {
            let alias = request.alias_for(type_uri)?;
            let listed = |aliases: &[String]| aliases.iter().any(|a| a == alias);
            let label = if listed(&request.required) {
                "required"
            } else if listed(&request.if_available) {
                "optional"
            } else {
                return None;
            };
            Some(format!(
                r#"<li><span class="attr">{}</span> <em>({})</em></li>"#,
                escape(type_uri),
                label
            ))
        })
        .collect();

    if items.is_empty() {
        return String::new();
    }
    format!(
        "<p>It also asks for:</p>\n        <ul class=\"attributes\">{}</ul>",
        items.concat()
    )
}

fn unknown_session() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Html("<h1>Error</h1><p>Unknown or expired login session</p>".to_string()),
    )
        .into_response()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
