use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        DeleteManyRequest, DeleteManyResult,
        cart::{
            AddToCartRequest, AdminCartLine, AdminCartList, AdminCreateCartRequest,
            AdminUpdateCartRequest, CartLine, CartQuantityUpdate, CartView, RemoveFromCartResult,
        },
    },
    entity::{
        books::{Column as BookCol, Entity as Books},
        cart_items::{self, ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::CartEntry,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::stock,
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartLineRow {
    id: Uuid,
    book_id: Uuid,
    quantity: i32,
    created_at: DateTimeWithTimeZone,
    title: String,
    author: String,
    image_url: String,
    price: Decimal,
    stock: i32,
}

#[derive(Debug, FromQueryResult)]
struct AdminCartRow {
    id: Uuid,
    user_id: Uuid,
    username: String,
    book_id: Uuid,
    title: String,
    quantity: i32,
    stock: i32,
    created_at: DateTimeWithTimeZone,
}

/// Every line of the caller's cart with current book data, oldest first.
pub async fn list_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let rows = CartItems::find()
        .select_only()
        .column_as(CartCol::Id, "id")
        .column_as(CartCol::BookId, "book_id")
        .column_as(CartCol::Quantity, "quantity")
        .column_as(CartCol::CreatedAt, "created_at")
        .column_as(BookCol::Title, "title")
        .column_as(BookCol::Author, "author")
        .column_as(BookCol::ImageUrl, "image_url")
        .column_as(BookCol::Price, "price")
        .column_as(BookCol::Stock, "stock")
        .join(JoinType::InnerJoin, cart_items::Relation::Books.def())
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .order_by_asc(CartCol::Id)
        .into_model::<CartLineRow>()
        .all(&state.orm)
        .await?;

    let items: Vec<CartLine> = rows
        .into_iter()
        .map(|row| CartLine {
            id: row.id,
            book_id: row.book_id,
            title: row.title,
            author: row.author,
            image_url: row.image_url,
            price: row.price,
            stock: row.stock,
            quantity: row.quantity,
            line_total: stock::line_total(row.price, row.quantity),
            created_at: row.created_at.with_timezone(&Utc),
        })
        .collect();
    let subtotal = items.iter().map(|line| line.line_total).sum();
    let total = items.len() as i64;

    Ok(ApiResponse::success(
        "OK",
        CartView { items, subtotal },
        Some(Meta::new(1, total.max(1), total)),
    ))
}

/// Adds `quantity` of a book. A repeat add grows the existing line, capped
/// at current stock; the cap is applied silently and the call succeeds.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartEntry>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;

    let book = Books::find_by_id(payload.book_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    stock::ensure_available(book.id, payload.quantity, book.stock)?;

    let existing = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::BookId.eq(book.id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let (entry, capped) = match existing {
        Some(item) => {
            let wanted = item.quantity.saturating_add(payload.quantity);
            let quantity = stock::clamp_to_stock(item.quantity, payload.quantity, book.stock);
            let mut active: CartActive = item.into();
            active.quantity = Set(quantity);
            (active.update(&txn).await?, quantity < wanted)
        }
        None => {
            let entry = CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                book_id: Set(book.id),
                quantity: Set(payload.quantity),
                created_at: Set(Utc::now().into()),
            }
            .insert(&txn)
            .await?;
            (entry, false)
        }
    };

    txn.commit().await?;

    tracing::info!(
        user_id = %user.user_id,
        book_id = %book.id,
        quantity = entry.quantity,
        capped,
        "cart line saved"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({ "book_id": book.id, "quantity": entry.quantity, "capped": capped }),
    )
    .await;

    let message = if capped {
        "Quantity capped at available stock"
    } else {
        "Added to cart"
    };
    Ok(ApiResponse::success(message, entry.into(), Some(Meta::empty())))
}

/// Sets the quantity of one of the caller's cart lines.
///
/// A quantity outside `1..=stock` is ignored rather than rejected: the line
/// keeps its quantity and the result reports `applied: false`.
pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    entry_id: Uuid,
    quantity: i32,
) -> AppResult<ApiResponse<CartQuantityUpdate>> {
    let txn = state.orm.begin().await?;

    let entry = CartItems::find_by_id(entry_id)
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let book = Books::find_by_id(entry.book_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if !stock::accepts_quantity(quantity, book.stock) {
        tracing::debug!(
            entry_id = %entry.id,
            requested = quantity,
            stock = book.stock,
            "quantity edit ignored"
        );
        return Ok(ApiResponse::success(
            "Quantity unchanged",
            CartQuantityUpdate {
                entry: entry.into(),
                applied: false,
            },
            Some(Meta::empty()),
        ));
    }

    let mut active: CartActive = entry.into();
    active.quantity = Set(quantity);
    let entry = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "entry_id": entry.id, "quantity": quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Quantity updated",
        CartQuantityUpdate {
            entry: entry.into(),
            applied: true,
        },
        Some(Meta::empty()),
    ))
}

/// Removes one of the caller's cart lines. Removing an id that no longer
/// exists succeeds with `removed: false`; another user's line is reported
/// as not found and left alone.
pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    entry_id: Uuid,
) -> AppResult<ApiResponse<RemoveFromCartResult>> {
    let entry = CartItems::find_by_id(entry_id).one(&state.orm).await?;
    let entry = match entry {
        None => {
            return Ok(ApiResponse::success(
                "Nothing to remove",
                RemoveFromCartResult { removed: false },
                Some(Meta::empty()),
            ));
        }
        Some(e) if e.user_id != user.user_id => return Err(AppError::NotFound),
        Some(e) => e,
    };

    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(entry.id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    let removed = result.rows_affected > 0;

    if removed {
        audit::record(
            &state.orm,
            Some(user.user_id),
            "cart_remove",
            "cart_items",
            serde_json::json!({ "entry_id": entry.id, "book_id": entry.book_id }),
        )
        .await;
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        RemoveFromCartResult { removed },
        Some(Meta::empty()),
    ))
}

pub async fn admin_list_carts(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<AdminCartList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let total = CartItems::find().count(&state.orm).await? as i64;

    let items = CartItems::find()
        .select_only()
        .column_as(CartCol::Id, "id")
        .column_as(CartCol::UserId, "user_id")
        .column_as(UserCol::Username, "username")
        .column_as(CartCol::BookId, "book_id")
        .column_as(BookCol::Title, "title")
        .column_as(CartCol::Quantity, "quantity")
        .column_as(BookCol::Stock, "stock")
        .column_as(CartCol::CreatedAt, "created_at")
        .join(JoinType::InnerJoin, cart_items::Relation::Users.def())
        .join(JoinType::InnerJoin, cart_items::Relation::Books.def())
        .order_by_desc(CartCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .into_model::<AdminCartRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|row| AdminCartLine {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            book_id: row.book_id,
            title: row.title,
            quantity: row.quantity,
            stock: row.stock,
            created_at: row.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(ApiResponse::success(
        "Cart entries",
        AdminCartList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn admin_create_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AdminCreateCartRequest,
) -> AppResult<ApiResponse<CartEntry>> {
    ensure_admin(user)?;
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;

    Users::find()
        .filter(UserCol::Id.eq(payload.user_id))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let book = Books::find_by_id(payload.book_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    stock::ensure_available(book.id, payload.quantity, book.stock)?;

    let duplicate = CartItems::find()
        .filter(CartCol::UserId.eq(payload.user_id))
        .filter(CartCol::BookId.eq(book.id))
        .one(&txn)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::BadRequest(
            "cart entry for this user and book already exists".into(),
        ));
    }

    let entry = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(payload.user_id),
        book_id: Set(book.id),
        quantity: Set(payload.quantity),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_cart_create",
        "cart_items",
        serde_json::json!({ "entry_id": entry.id, "owner_id": entry.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart entry created",
        entry.into(),
        Some(Meta::empty()),
    ))
}

pub async fn admin_update_cart(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateCartRequest,
) -> AppResult<ApiResponse<CartEntry>> {
    ensure_admin(user)?;
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let txn = state.orm.begin().await?;

    let entry = CartItems::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let book = Books::find_by_id(entry.book_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    stock::ensure_available(book.id, payload.quantity, book.stock)?;

    let mut active: CartActive = entry.into();
    active.quantity = Set(payload.quantity);
    let entry = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_cart_update",
        "cart_items",
        serde_json::json!({ "entry_id": entry.id, "quantity": entry.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart entry updated",
        entry.into(),
        Some(Meta::empty()),
    ))
}

pub async fn admin_delete_carts(
    state: &AppState,
    user: &AuthUser,
    payload: DeleteManyRequest,
) -> AppResult<ApiResponse<DeleteManyResult>> {
    ensure_admin(user)?;
    if payload.ids.is_empty() {
        return Ok(ApiResponse::success(
            "Nothing to delete",
            DeleteManyResult { deleted: 0 },
            Some(Meta::empty()),
        ));
    }

    let result = CartItems::delete_many()
        .filter(CartCol::Id.is_in(payload.ids.clone()))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_cart_delete",
        "cart_items",
        serde_json::json!({ "ids": payload.ids, "deleted": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        DeleteManyResult {
            deleted: result.rows_affected,
        },
        Some(Meta::empty()),
    ))
}
