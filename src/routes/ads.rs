use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::ads::forms::{self, AdFormErrors, AdFormValues};
use crate::ads::store::{self, AdChanges};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::humanize::{naturalsize, naturaltime};
use crate::routes::Html;
use crate::state::AppState;
use crate::uploads;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/ad/create", get(create_form).post(create))
        .route("/ad/{id}", get(detail))
        .route("/ad/{id}/update", get(update_form).post(update))
        .route("/ad/{id}/delete", post(delete))
        .route("/ad/{id}/comment", post(create_comment))
        .route("/comment/{id}/delete", post(delete_comment))
        .route("/ad/{id}/favorite", post(add_favorite))
        .route("/ad/{id}/unfavorite", post(remove_favorite))
}

// --- Templates ---------------------------------------------------------

#[derive(Template)]
#[template(path = "ad_list.html")]
struct AdListTemplate {
    ads: Vec<AdRow>,
    search: String,
    viewer: Option<String>,
}

struct AdRow {
    id: String,
    title: String,
    price: Option<String>,
    picture: Option<String>,
    owner_name: String,
    natural_updated: String,
    favorite: bool,
}

#[derive(Template)]
#[template(path = "ad_detail.html")]
struct AdDetailTemplate {
    id: String,
    title: String,
    price: Option<String>,
    text: String,
    picture: Option<String>,
    owner_name: String,
    natural_updated: String,
    tags: Vec<String>,
    is_owner: bool,
    favorite: bool,
    viewer: Option<String>,
    comments: Vec<CommentRow>,
    comment_error: Option<String>,
    comment_value: String,
}

struct CommentRow {
    id: String,
    text: String,
    excerpt: String,
    owner_name: String,
    natural_updated: String,
    can_delete: bool,
}

#[derive(Template)]
#[template(path = "ad_form.html")]
struct AdFormTemplate {
    heading: String,
    action: String,
    values: AdFormValues,
    errors: AdFormErrors,
    upload_label: String,
}

impl AdFormTemplate {
    fn new(state: &AppState, heading: &str, action: String, values: AdFormValues) -> Self {
        Self {
            heading: heading.to_string(),
            action,
            values,
            errors: AdFormErrors::default(),
            upload_label: format!(
                "File to upload <= {}",
                naturalsize(state.config.media.max_upload_bytes)
            ),
        }
    }
}

// --- List and detail ---------------------------------------------------

#[derive(Deserialize)]
struct SearchParams {
    search: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let ads = store::list_ads(&conn, params.search.as_deref())?;

    let favorites = match &viewer {
        Some(user) => store::favorite_ad_ids(&conn, &user.id)?,
        None => Default::default(),
    };

    let rows = ads
        .into_iter()
        .map(|item| AdRow {
            favorite: favorites.contains(&item.ad.id),
            natural_updated: naturaltime(&item.ad.updated_at),
            id: item.ad.id,
            title: item.ad.title,
            price: item.ad.price,
            picture: item.ad.picture,
            owner_name: item.owner_name,
        })
        .collect();

    Ok(Html(AdListTemplate {
        ads: rows,
        search: params.search.unwrap_or_default(),
        viewer: viewer.map(|u| u.username),
    })
    .into_response())
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Response> {
    render_detail(&state, &id, &viewer, None, String::new())
}

/// Shared by the detail view and the comment-form error path.
fn render_detail(
    state: &AppState,
    ad_id: &str,
    viewer: &Option<CurrentUser>,
    comment_error: Option<String>,
    comment_value: String,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let item = store::get_ad_with_owner(&conn, ad_id)?;
    let tags = store::tags_for_ad(&conn, ad_id)?;
    let comments = store::comments_for_ad(&conn, ad_id)?;

    let viewer_id = viewer.as_ref().map(|u| u.id.as_str());
    let favorite = match viewer_id {
        Some(uid) => store::favorite_ad_ids(&conn, uid)?.contains(ad_id),
        None => false,
    };

    let comment_rows = comments
        .into_iter()
        .map(|c| CommentRow {
            can_delete: viewer_id == Some(c.comment.owner_id.as_str()),
            excerpt: c.comment.excerpt(),
            natural_updated: naturaltime(&c.comment.updated_at),
            id: c.comment.id,
            text: c.comment.text,
            owner_name: c.owner_name,
        })
        .collect();

    Ok(Html(AdDetailTemplate {
        is_owner: viewer_id == Some(item.ad.owner_id.as_str()),
        favorite,
        id: item.ad.id,
        title: item.ad.title,
        price: item.ad.price,
        text: item.ad.text,
        picture: item.ad.picture,
        owner_name: item.owner_name,
        natural_updated: naturaltime(&item.ad.updated_at),
        tags,
        viewer: viewer.as_ref().map(|u| u.username.clone()),
        comments: comment_rows,
        comment_error,
        comment_value,
    })
    .into_response())
}

// --- Create / update / delete ------------------------------------------

async fn create_form(State(state): State<AppState>, _user: CurrentUser) -> impl IntoResponse {
    Html(AdFormTemplate::new(
        &state,
        "New ad",
        "/ad/create".to_string(),
        AdFormValues::default(),
    ))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let sub = read_ad_form(multipart).await?;
    let picture_len = sub.picture.as_ref().map(|(_, bytes)| bytes.len() as u64);

    let valid = match forms::validate_ad(&sub.values, picture_len, state.config.media.max_upload_bytes)
    {
        Ok(valid) => valid,
        Err(errors) => {
            let mut template =
                AdFormTemplate::new(&state, "New ad", "/ad/create".to_string(), sub.values);
            template.errors = errors;
            return Ok(Html(template).into_response());
        }
    };

    let picture = store_submitted_picture(&state, &sub)?;

    let conn = state.db.get()?;
    let id = store::create_ad(
        &conn,
        &user.id,
        &AdChanges {
            title: valid.title,
            price: valid.price,
            text: valid.text,
            picture: picture.clone(),
            tags: valid.tags,
        },
    )?;
    tracing::info!("Ad {} created by {}", id, user.username);

    // Post-save pass: the row and original file are already persisted;
    // a shrink failure leaves an oversized but valid picture behind.
    if let Some(relative) = &picture {
        post_save_shrink(&state, relative);
    }

    Ok(Redirect::to("/").into_response())
}

async fn update_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let ad = store::authorize_ad_mutation(&conn, &id, &user.id)?;
    let tags = store::tags_for_ad(&conn, &id)?;

    let values = AdFormValues {
        title: ad.title,
        price: ad.price.unwrap_or_default(),
        text: ad.text,
        tags: tags.join(", "),
    };
    Ok(Html(AdFormTemplate::new(
        &state,
        "Edit ad",
        format!("/ad/{}/update", id),
        values,
    ))
    .into_response())
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let old = {
        let conn = state.db.get()?;
        store::authorize_ad_mutation(&conn, &id, &user.id)?
    };

    let sub = read_ad_form(multipart).await?;
    let picture_len = sub.picture.as_ref().map(|(_, bytes)| bytes.len() as u64);

    let valid = match forms::validate_ad(&sub.values, picture_len, state.config.media.max_upload_bytes)
    {
        Ok(valid) => valid,
        Err(errors) => {
            let mut template = AdFormTemplate::new(
                &state,
                "Edit ad",
                format!("/ad/{}/update", id),
                sub.values,
            );
            template.errors = errors;
            return Ok(Html(template).into_response());
        }
    };

    // `None` keeps the current picture
    let picture = store_submitted_picture(&state, &sub)?;

    let conn = state.db.get()?;
    store::update_ad(
        &conn,
        &id,
        &AdChanges {
            title: valid.title,
            price: valid.price,
            text: valid.text,
            picture: picture.clone(),
            tags: valid.tags,
        },
    )?;

    if let Some(relative) = &picture {
        if let Some(previous) = &old.picture {
            uploads::remove_picture(state.config.media_path(), previous);
        }
        post_save_shrink(&state, relative);
    }

    Ok(Redirect::to("/").into_response())
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let ad = store::authorize_ad_mutation(&conn, &id, &user.id)?;
    store::delete_ad(&conn, &id)?;
    tracing::info!("Ad {} deleted by {}", id, user.username);

    if let Some(relative) = &ad.picture {
        uploads::remove_picture(state.config.media_path(), relative);
    }
    Ok(Redirect::to("/").into_response())
}

// --- Comments ----------------------------------------------------------

#[derive(Deserialize)]
struct CommentForm {
    comment: String,
}

async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let text = match forms::validate_comment(&form.comment) {
        Ok(text) => text,
        Err(msg) => {
            let viewer = Some(user);
            return render_detail(&state, &id, &viewer, Some(msg), form.comment);
        }
    };

    let conn = state.db.get()?;
    store::create_comment(&conn, &id, &user.id, &text)?;
    Ok(Redirect::to(&format!("/ad/{}", id)).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    // Read the parent ad id before the row disappears
    let comment = store::authorize_comment_mutation(&conn, &id, &user.id)?;
    store::delete_comment(&conn, &id)?;
    Ok(Redirect::to(&format!("/ad/{}", comment.ad_id)).into_response())
}

// --- Favorites ---------------------------------------------------------

async fn add_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    store::add_favorite(&conn, &user.id, &id)?;
    Ok(StatusCode::OK)
}

async fn remove_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    store::remove_favorite(&conn, &user.id, &id)?;
    Ok(StatusCode::OK)
}

// --- Multipart plumbing ------------------------------------------------

struct AdSubmission {
    values: AdFormValues,
    /// Original filename and bytes, when a picture was attached.
    picture: Option<(String, Vec<u8>)>,
}

async fn read_ad_form(mut multipart: Multipart) -> AppResult<AdSubmission> {
    let mut values = AdFormValues::default();
    let mut picture = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => values.title = read_text(field).await?,
            "price" => values.price = read_text(field).await?,
            "text" => values.text = read_text(field).await?,
            "tags" => values.tags = read_text(field).await?,
            "picture" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Upload failed: {}", e)))?;
                // Browsers send an empty picture part when nothing was chosen
                if !filename.is_empty() && !bytes.is_empty() {
                    picture = Some((filename, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    Ok(AdSubmission { values, picture })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form data: {}", e)))
}

fn store_submitted_picture(state: &AppState, sub: &AdSubmission) -> AppResult<Option<String>> {
    match &sub.picture {
        Some((filename, bytes)) => {
            let relative = uploads::store_picture(state.config.media_path(), filename, bytes)
                .map_err(|e| AppError::Internal(format!("Storing upload failed: {}", e)))?;
            Ok(Some(relative))
        }
        None => Ok(None),
    }
}

fn post_save_shrink(state: &AppState, relative: &str) {
    let path = uploads::picture_path(state.config.media_path(), relative);
    if let Err(e) = uploads::shrink_oversized(&path) {
        tracing::warn!("Post-save shrink failed for {}: {}", path.display(), e);
    }
}
