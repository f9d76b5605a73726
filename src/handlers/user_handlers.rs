//! HTTP handlers for the `/user` resource.

use crate::{errors::AppError, models::user::UpsertUserRequest, state::AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// `GET /user` — every stored location as a JSON array.
pub async fn list_users(State(state): State<AppState>) -> Result<Response, AppError> {
    let users = state.users.list_users().await?;

    let body = serde_json::to_vec(&users)
        .map_err(|err| AppError::internal(format!("Could not encode users: {}", err)))?;

    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// `POST /user` — insert or update one location.
///
/// The body is decoded regardless of its declared content type; numeric
/// fields arrive as JSON strings and are parsed before touching the store.
pub async fn upsert_user(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let request: UpsertUserRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("Could not parse request body: {}", err)))?;
    let location = request.into_location()?;

    state.users.upsert_user(&location).await?;

    tracing::info!(id = %location.id, kind = location.kind, "stored user location");
    Ok(StatusCode::OK)
}
