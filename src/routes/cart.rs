use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::cart::{
        AddToCartRequest, CartQuantityUpdate, CartView, RemoveFromCartResult,
        UpdateCartQuantityRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::CartEntry,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart_list).post(add_to_cart))
        .route("/{id}", patch(update_quantity).delete(remove_from_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart lines for current user with subtotal", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::list_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 201, description = "Added, or existing line increased and capped at stock", body = ApiResponse<CartEntry>),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Insufficient stock")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CartEntry>>)> {
    let resp = cart_service::add_to_cart(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/cart/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart entry ID")
    ),
    request_body = UpdateCartQuantityRequest,
    responses(
        (status = 200, description = "Quantity set; `applied` is false when it was out of range", body = ApiResponse<CartQuantityUpdate>),
        (status = 404, description = "Entry not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartQuantityUpdate>>> {
    let resp = cart_service::update_quantity(&state, &user, id, payload.quantity).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart entry ID")
    ),
    responses(
        (status = 200, description = "Removed, or nothing to remove", body = ApiResponse<RemoveFromCartResult>),
        (status = 404, description = "Entry belongs to another user")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<RemoveFromCartResult>>> {
    let resp = cart_service::remove_from_cart(&state, &user, id).await?;
    Ok(Json(resp))
}
