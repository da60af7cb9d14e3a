use askama::Template;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::{self, session};
use crate::error::AppResult;
use crate::extractors::session_token;
use crate::routes::Html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup_page).post(signup))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    username: String,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    error: Option<String>,
    username: String,
}

#[derive(Deserialize)]
struct CredentialsForm {
    username: String,
    password: String,
}

async fn login_page() -> impl IntoResponse {
    Html(LoginTemplate {
        error: None,
        username: String::new(),
    })
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();
    match auth::verify_credentials(&state.db, &username, &form.password)? {
        Some(user_id) => start_session(&state, &user_id),
        None => Ok(Html(LoginTemplate {
            error: Some("Invalid username or password".to_string()),
            username,
        })
        .into_response()),
    }
}

async fn signup_page() -> impl IntoResponse {
    Html(SignupTemplate {
        error: None,
        username: String::new(),
    })
}

async fn signup(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();

    let rerender = |msg: &str, username: String| {
        Html(SignupTemplate {
            error: Some(msg.to_string()),
            username,
        })
        .into_response()
    };

    if username.is_empty() || form.password.len() < 8 {
        return Ok(rerender(
            "Username is required and the password needs at least 8 characters",
            username,
        ));
    }

    match auth::create_user(&state.db, &username, &form.password) {
        Ok(user_id) => start_session(&state, &user_id),
        // Unique constraint on username
        Err(crate::error::AppError::Database(_)) => {
            Ok(rerender("That username is taken", username))
        }
        Err(e) => Err(e),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    let clear = format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok((
        [(header::SET_COOKIE, clear)],
        Redirect::to("/"),
    )
        .into_response())
}

fn start_session(state: &AppState, user_id: &str) -> AppResult<Response> {
    let token = session::create_session(&state.db, user_id, state.config.auth.session_hours)?;
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}
