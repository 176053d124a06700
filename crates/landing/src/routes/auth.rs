//! "Continue" button and Google sign-in route handlers.
//!
//! - `GET /session` renders the button for the visitor's current auth state
//! - `GET /auth/continue` deep-links a signed-in visitor, otherwise starts
//!   Google sign-in with a CSRF state kept in the session
//! - `GET /auth/google/callback` finishes sign-in and deep-links
//! - `POST /auth/logout` signs out and re-renders the button

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rand::{Rng, distr::Alphanumeric};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::Visitor;
use crate::models::session_keys;
use crate::services::{ContinueAction, InteractiveGrant, SessionView, SignInResult};
use crate::state::AppState;

/// Length of the OAuth CSRF state.
const OAUTH_STATE_LENGTH: usize = 32;

/// Continue button display data for templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueButtonView {
    pub is_loading: bool,
    pub is_signed_in: bool,
    pub greeting: Option<String>,
    pub photo_url: Option<String>,
}

impl From<&SessionView> for ContinueButtonView {
    fn from(view: &SessionView) -> Self {
        match view {
            SessionView::Loading => Self {
                is_loading: true,
                ..Self::default()
            },
            SessionView::Unauthenticated => Self::default(),
            SessionView::Authenticated(identity) => Self {
                is_loading: false,
                is_signed_in: true,
                greeting: (!identity.is_anonymous).then(|| identity.greeting_name().to_string()),
                photo_url: identity.photo_url.clone(),
            },
        }
    }
}

/// Continue button fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/continue_button.html")]
pub struct ContinueButtonTemplate {
    pub session: ContinueButtonView,
}

/// Query parameters from the Google OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// The grant this callback carries, if any.
    fn into_grant(self, redirect_uri: String) -> Option<InteractiveGrant> {
        match (self.error, self.code) {
            (Some(error), _) => Some(InteractiveGrant::Error {
                error,
                description: self.error_description,
            }),
            (None, Some(code)) => Some(InteractiveGrant::Code { code, redirect_uri }),
            (None, None) => None,
        }
    }
}

/// Generate a random alphanumeric string.
fn generate_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Render the continue button once the auth state is known (HTMX).
#[instrument(skip(state, visitor))]
pub async fn session_button(State(state): State<AppState>, visitor: Visitor) -> impl IntoResponse {
    let mut controller = state.session_controller(visitor.identity.clone());
    let view = controller.refresh().await;

    ContinueButtonTemplate {
        session: ContinueButtonView::from(view),
    }
}

/// Handle a press of the continue button.
///
/// # Route
///
/// `GET /auth/continue`
#[instrument(skip(state, visitor))]
pub async fn continue_to_product(
    State(state): State<AppState>,
    visitor: Visitor,
) -> Result<Response> {
    let mut controller = state.session_controller(visitor.identity.clone());

    match controller.continue_action().await {
        ContinueAction::Redirect(url) => {
            // Fetching the token may have rotated the refresh token.
            visitor.save_sign_in().await?;
            add_breadcrumb("auth", "Continued to product", None);
            Ok(Redirect::to(url.as_str()).into_response())
        }
        ContinueAction::SignIn => {
            let oauth_state = generate_random_string(OAUTH_STATE_LENGTH);
            visitor
                .save(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
                .await?;

            let auth_url =
                controller.sign_in_url(&state.config().google_redirect_uri(), &oauth_state);
            Ok(Redirect::to(&auth_url).into_response())
        }
    }
}

/// Handle the Google OAuth callback.
///
/// # Route
///
/// `GET /auth/google/callback`
#[instrument(skip(state, visitor, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    visitor: Visitor,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    // One-time use
    let stored_state: Option<String> = visitor
        .session
        .remove(session_keys::GOOGLE_OAUTH_STATE)
        .await?;

    if stored_state.is_none() || stored_state != query.state {
        tracing::warn!("Google OAuth state mismatch");
        return Err(AppError::BadRequest("invalid sign-in state".to_string()));
    }

    let Some(grant) = query.into_grant(state.config().google_redirect_uri()) else {
        tracing::warn!("Google OAuth callback carried neither code nor error");
        return Err(AppError::BadRequest("missing authorization code".to_string()));
    };

    let mut controller = state.session_controller(visitor.identity.clone());
    let result = controller.complete_sign_in(grant).await;
    visitor.save_sign_in().await?;

    match result {
        SignInResult::Redirect(url) => {
            if let SessionView::Authenticated(identity) = controller.view() {
                set_sentry_user(&identity.uid, identity.email.as_deref());
            }
            add_breadcrumb("auth", "Signed in with Google", None);
            Ok(Redirect::to(url.as_str()).into_response())
        }
        SignInResult::Dismissed => Ok(Redirect::to("/").into_response()),
        SignInResult::Failed(message) => {
            visitor.save(session_keys::SIGN_IN_ERROR, &message).await?;
            Ok(Redirect::to("/").into_response())
        }
    }
}

/// Sign out and re-render the continue button (HTMX).
///
/// # Route
///
/// `POST /auth/logout`
#[instrument(skip(state, visitor))]
pub async fn logout(State(state): State<AppState>, visitor: Visitor) -> Result<impl IntoResponse> {
    let mut controller = state.session_controller(visitor.identity.clone());
    controller.sign_out().await;
    visitor.save_sign_in().await?;
    clear_sentry_user();

    Ok(ContinueButtonTemplate {
        session: ContinueButtonView::from(controller.view()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axon_core::AuthIdentity;

    fn query(code: Option<&str>, error: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(String::from),
            state: Some("state".to_string()),
            error: error.map(String::from),
            error_description: None,
        }
    }

    #[test]
    fn test_generate_random_string() {
        let value = generate_random_string(OAUTH_STATE_LENGTH);
        assert_eq!(value.len(), OAUTH_STATE_LENGTH);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(value, generate_random_string(OAUTH_STATE_LENGTH));
    }

    #[test]
    fn test_callback_error_wins_over_code() {
        let grant = query(Some("abc"), Some("access_denied"))
            .into_grant("http://localhost/cb".to_string())
            .unwrap();
        assert!(matches!(grant, InteractiveGrant::Error { error, .. } if error == "access_denied"));
    }

    #[test]
    fn test_callback_code_carries_redirect_uri() {
        let grant = query(Some("abc"), None)
            .into_grant("http://localhost/cb".to_string())
            .unwrap();
        assert_eq!(
            grant,
            InteractiveGrant::Code {
                code: "abc".to_string(),
                redirect_uri: "http://localhost/cb".to_string(),
            }
        );
    }

    #[test]
    fn test_callback_without_code_or_error() {
        assert!(query(None, None).into_grant(String::new()).is_none());
    }

    #[test]
    fn test_button_view_for_anonymous_identity_has_no_greeting() {
        let view =
            ContinueButtonView::from(&SessionView::Authenticated(AuthIdentity::anonymous("a")));
        assert!(view.is_signed_in);
        assert!(view.greeting.is_none());
    }

    #[test]
    fn test_button_renders_each_state() {
        let loading = ContinueButtonTemplate {
            session: ContinueButtonView::from(&SessionView::Loading),
        }
        .render()
        .unwrap();
        assert!(loading.contains("hx-get=\"/session\""));

        let signed_out = ContinueButtonTemplate {
            session: ContinueButtonView::from(&SessionView::Unauthenticated),
        }
        .render()
        .unwrap();
        assert!(signed_out.contains("href=\"/auth/continue\""));
        assert!(!signed_out.contains("/auth/logout"));

        let identity = AuthIdentity {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            email: None,
            photo_url: None,
            is_anonymous: false,
        };
        let signed_in = ContinueButtonTemplate {
            session: ContinueButtonView::from(&SessionView::Authenticated(identity)),
        }
        .render()
        .unwrap();
        assert!(signed_in.contains("Continue as Ada"));
        assert!(signed_in.contains("hx-post=\"/auth/logout\""));
    }
}
