use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::contact::SendMessageRequest,
    error::AppResult,
    models::ContactMessage,
    response::ApiResponse,
    services::contact_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(send_message))
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = ApiResponse<ContactMessage>),
        (status = 400, description = "Missing name, email or message")
    ),
    tag = "Contact"
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ContactMessage>>)> {
    let resp = contact_service::send_message(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}
