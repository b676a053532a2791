use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        DeleteManyRequest, DeleteManyResult,
        cart::{AdminCartList, AdminCreateCartRequest, AdminUpdateCartRequest},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::CartEntry,
    response::ApiResponse,
    routes::params::Pagination,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/carts", get(list_carts).post(create_cart).delete(delete_carts))
        .route("/carts/{id}", put(update_cart))
}

#[utoipa::path(
    get,
    path = "/api/admin/carts",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 10")
    ),
    responses(
        (status = 200, description = "All cart entries", body = ApiResponse<AdminCartList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_carts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<AdminCartList>>> {
    let resp = cart_service::admin_list_carts(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/carts",
    request_body = AdminCreateCartRequest,
    responses(
        (status = 201, description = "Cart entry created", body = ApiResponse<CartEntry>),
        (status = 400, description = "Invalid quantity or duplicate entry"),
        (status = 409, description = "Insufficient stock")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AdminCreateCartRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CartEntry>>)> {
    let resp = cart_service::admin_create_cart(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/admin/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart entry ID")),
    request_body = AdminUpdateCartRequest,
    responses(
        (status = 200, description = "Quantity changed", body = ApiResponse<CartEntry>),
        (status = 404, description = "Entry not found"),
        (status = 409, description = "Insufficient stock")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateCartRequest>,
) -> AppResult<Json<ApiResponse<CartEntry>>> {
    let resp = cart_service::admin_update_cart(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/carts",
    request_body = DeleteManyRequest,
    responses(
        (status = 200, description = "Cart entries deleted", body = ApiResponse<DeleteManyResult>)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_carts(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeleteManyRequest>,
) -> AppResult<Json<ApiResponse<DeleteManyResult>>> {
    let resp = cart_service::admin_delete_carts(&state, &user, payload).await?;
    Ok(Json(resp))
}
