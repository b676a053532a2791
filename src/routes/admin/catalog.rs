use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        DeleteManyRequest, DeleteManyResult,
        catalog::{BookList, CategoryRequest, CreateBookRequest, DashboardStats, UpdateBookRequest},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Book, Category},
    response::ApiResponse,
    routes::params::LowStockQuery,
    services::catalog_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/categories", post(create_category).delete(delete_categories))
        .route("/categories/{id}", put(update_category))
        .route("/books", post(create_book).delete(delete_books))
        .route("/books/low-stock", get(list_low_stock))
        .route("/books/{id}", put(update_book))
}

#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Row counts for the back office", body = ApiResponse<DashboardStats>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let resp = catalog_service::dashboard(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<Category>),
        (status = 400, description = "Blank or duplicate name")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CategoryRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Category>>)> {
    let resp = catalog_service::create_category(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category renamed", body = ApiResponse<Category>),
        (status = 404, description = "Category not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryRequest>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = catalog_service::update_category(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/categories",
    request_body = DeleteManyRequest,
    responses(
        (status = 200, description = "Categories deleted", body = ApiResponse<DeleteManyResult>),
        (status = 400, description = "A category still has books")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_categories(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeleteManyRequest>,
) -> AppResult<Json<ApiResponse<DeleteManyResult>>> {
    let resp = catalog_service::delete_categories(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book created", body = ApiResponse<Book>),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Book>>)> {
    let resp = catalog_service::create_book(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/admin/books/{id}",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBookRequest,
    responses(
        (status = 200, description = "Book updated", body = ApiResponse<Book>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Book not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookRequest>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let resp = catalog_service::update_book(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/books",
    request_body = DeleteManyRequest,
    responses(
        (status = 200, description = "Books deleted", body = ApiResponse<DeleteManyResult>),
        (status = 400, description = "A book appears in an order")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_books(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeleteManyRequest>,
) -> AppResult<Json<ApiResponse<DeleteManyResult>>> {
    let resp = catalog_service::delete_books(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/books/low-stock",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 10"),
        ("threshold" = Option<i32>, Query, description = "Stock at or below this value, default 5")
    ),
    responses(
        (status = 200, description = "Books running low", body = ApiResponse<BookList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<ApiResponse<BookList>>> {
    let resp = catalog_service::list_low_stock(&state, &user, query).await?;
    Ok(Json(resp))
}
