use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::contact::ContactMessageList,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::Pagination,
    services::contact_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/messages", get(list_messages))
}

#[utoipa::path(
    get,
    path = "/api/admin/messages",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 10")
    ),
    responses(
        (status = 200, description = "Contact messages, newest first", body = ApiResponse<ContactMessageList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ContactMessageList>>> {
    let resp = contact_service::list_messages(&state, &user, pagination).await?;
    Ok(Json(resp))
}
