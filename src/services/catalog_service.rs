use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        DeleteManyRequest, DeleteManyResult,
        catalog::{
            BookList, CategoryList, CategoryRequest, CreateBookRequest, DashboardStats,
            UpdateBookRequest,
        },
    },
    entity::{
        CartItems, ContactMessages, Orders, Users,
        books::{self, ActiveModel as BookActive, Column as BookCol, Entity as Books},
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Book, Category},
    response::{ApiResponse, Meta},
    routes::params::{BookQuery, BookSortBy, LowStockQuery, SortOrder},
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

fn max_price() -> Decimal {
    Decimal::new(99_999_999, 2)
}

#[derive(Debug, FromQueryResult)]
struct BookRow {
    id: Uuid,
    title: String,
    author: String,
    description: Option<String>,
    price: Decimal,
    stock: i32,
    category_id: Uuid,
    category_name: String,
    image_url: String,
    created_at: DateTimeWithTimeZone,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            price: row.price,
            stock: row.stock,
            category_id: row.category_id,
            category_name: row.category_name,
            image_url: row.image_url,
            created_at: row.created_at.with_timezone(&Utc),
        }
    }
}

/// Books joined with their category name, flattened into [`BookRow`] columns.
fn books_with_category() -> Select<Books> {
    Books::find()
        .select_only()
        .column_as(BookCol::Id, "id")
        .column_as(BookCol::Title, "title")
        .column_as(BookCol::Author, "author")
        .column_as(BookCol::Description, "description")
        .column_as(BookCol::Price, "price")
        .column_as(BookCol::Stock, "stock")
        .column_as(BookCol::CategoryId, "category_id")
        .column_as(CategoryCol::Name, "category_name")
        .column_as(BookCol::ImageUrl, "image_url")
        .column_as(BookCol::CreatedAt, "created_at")
        .join(JoinType::InnerJoin, books::Relation::Categories.def())
}

async fn load_book(state: &AppState, id: Uuid) -> AppResult<Book> {
    books_with_category()
        .filter(BookCol::Id.eq(id))
        .into_model::<BookRow>()
        .one(&state.orm)
        .await?
        .map(Book::from)
        .ok_or(AppError::NotFound)
}

const LIKE_ESCAPE: char = '\\';

/// Lowercased `%term%` pattern with the LIKE wildcards in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub async fn list_books(state: &AppState, query: BookQuery) -> AppResult<ApiResponse<BookList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(
                    Expr::expr(Func::lower(Expr::col((Books, BookCol::Title))))
                        .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
                )
                .add(
                    Expr::expr(Func::lower(Expr::col((Books, BookCol::Author))))
                        .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE)),
                ),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(BookCol::CategoryId.eq(category_id));
    }

    let sort_col = match query.sort_by.unwrap_or(BookSortBy::CreatedAt) {
        BookSortBy::CreatedAt => BookCol::CreatedAt,
        BookSortBy::Price => BookCol::Price,
        BookSortBy::Title => BookCol::Title,
    };

    let total = Books::find().filter(condition.clone()).count(&state.orm).await? as i64;

    let mut finder = books_with_category().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let items = finder
        .order_by_asc(BookCol::Id)
        .limit(limit as u64)
        .offset(offset as u64)
        .into_model::<BookRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Book::from)
        .collect();

    Ok(ApiResponse::success(
        "Books",
        BookList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_book(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Book>> {
    let book = load_book(state, id).await?;
    Ok(ApiResponse::success("Book", book, None))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

fn category_name(payload: CategoryRequest) -> AppResult<String> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    Ok(name)
}

async fn ensure_category_name_free(
    state: &AppState,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Categories::find().filter(CategoryCol::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(CategoryCol::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::BadRequest(format!("category '{name}' already exists")));
    }
    Ok(())
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let name = category_name(payload)?;
    ensure_category_name_free(state, &name, None).await?;

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        category.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let name = category_name(payload)?;

    let category = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_category_name_free(state, &name, Some(id)).await?;

    let mut active: CategoryActive = category.into();
    active.name = Set(name);
    let category = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category updated",
        category.into(),
        Some(Meta::empty()),
    ))
}

/// Deletes categories that no book points at. One category still in use
/// rejects the whole batch.
pub async fn delete_categories(
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

    let in_use = Books::find()
        .filter(BookCol::CategoryId.is_in(payload.ids.clone()))
        .count(&state.orm)
        .await?;
    if in_use > 0 {
        return Err(AppError::BadRequest(
            "category still has books assigned".into(),
        ));
    }

    let result = Categories::delete_many()
        .filter(CategoryCol::Id.is_in(payload.ids.clone()))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "category_delete",
        "categories",
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

fn validate_book_fields(title: &str, author: &str, price: Decimal, stock: i32) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    if author.trim().is_empty() {
        return Err(AppError::BadRequest("author is required".into()));
    }
    if price.is_sign_negative() || price > max_price() {
        return Err(AppError::BadRequest(
            "price must be between 0 and 999999.99".into(),
        ));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    Ok(())
}

async fn ensure_category_exists(state: &AppState, id: Uuid) -> AppResult<()> {
    Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("category {id} does not exist")))?;
    Ok(())
}

pub async fn create_book(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBookRequest,
) -> AppResult<ApiResponse<Book>> {
    ensure_admin(user)?;
    validate_book_fields(&payload.title, &payload.author, payload.price, payload.stock)?;
    ensure_category_exists(state, payload.category_id).await?;

    let book = BookActive {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        author: Set(payload.author.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price.round_dp(2)),
        stock: Set(payload.stock),
        category_id: Set(payload.category_id),
        image_url: Set(payload.image_url.unwrap_or_default()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(book_id = %book.id, stock = book.stock, "book created");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "book_create",
        "books",
        serde_json::json!({ "book_id": book.id }),
    )
    .await;

    let book = load_book(state, book.id).await?;
    Ok(ApiResponse::success("Book created", book, Some(Meta::empty())))
}

/// Partial update. Price edits only affect future orders; existing order
/// items keep the price they were bought at.
pub async fn update_book(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBookRequest,
) -> AppResult<ApiResponse<Book>> {
    ensure_admin(user)?;

    let current = Books::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let title = payload.title.unwrap_or_else(|| current.title.clone());
    let author = payload.author.unwrap_or_else(|| current.author.clone());
    let price = payload.price.unwrap_or(current.price);
    let stock = payload.stock.unwrap_or(current.stock);
    validate_book_fields(&title, &author, price, stock)?;
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
    }

    let mut active: BookActive = current.into();
    active.title = Set(title.trim().to_string());
    active.author = Set(author.trim().to_string());
    active.price = Set(price.round_dp(2));
    active.stock = Set(stock);
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(image_url);
    }
    let book = active.update(&state.orm).await?;

    tracing::info!(book_id = %book.id, price = %book.price, stock = book.stock, "book updated");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "book_update",
        "books",
        serde_json::json!({ "book_id": book.id }),
    )
    .await;

    let book = load_book(state, book.id).await?;
    Ok(ApiResponse::success("Book updated", book, Some(Meta::empty())))
}

/// Deletes books that were never ordered. Cart lines pointing at them go
/// with them.
pub async fn delete_books(
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

    let ordered = OrderItems::find()
        .filter(OrderItemCol::BookId.is_in(payload.ids.clone()))
        .count(&state.orm)
        .await?;
    if ordered > 0 {
        return Err(AppError::BadRequest(
            "book is referenced by existing orders".into(),
        ));
    }

    let result = Books::delete_many()
        .filter(BookCol::Id.is_in(payload.ids.clone()))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "book_delete",
        "books",
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

/// Books with stock at or below the threshold, scarcest first.
pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<BookList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0);

    let total = Books::find()
        .filter(BookCol::Stock.lte(threshold))
        .count(&state.orm)
        .await? as i64;

    let items = books_with_category()
        .filter(BookCol::Stock.lte(threshold))
        .order_by_asc(BookCol::Stock)
        .order_by_asc(BookCol::Title)
        .limit(limit as u64)
        .offset(offset as u64)
        .into_model::<BookRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Book::from)
        .collect();

    Ok(ApiResponse::success(
        "Low stock",
        BookList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let stats = DashboardStats {
        users: Users::find().count(&state.orm).await?,
        books: Books::find().count(&state.orm).await?,
        categories: Categories::find().count(&state.orm).await?,
        orders: Orders::find().count(&state.orm).await?,
        cart_entries: CartItems::find().count(&state.orm).await?,
        contact_messages: ContactMessages::find().count(&state.orm).await?,
    };

    Ok(ApiResponse::success("Dashboard", stats, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_fields_are_validated() {
        assert!(validate_book_fields("Dune", "Herbert", Decimal::new(1000, 2), 0).is_ok());
        assert!(validate_book_fields("Dune", "Herbert", max_price(), 3).is_ok());
        assert!(validate_book_fields(" ", "Herbert", Decimal::ONE, 1).is_err());
        assert!(validate_book_fields("Dune", "", Decimal::ONE, 1).is_err());
        assert!(validate_book_fields("Dune", "Herbert", Decimal::new(-1, 2), 1).is_err());
        assert!(validate_book_fields("Dune", "Herbert", Decimal::new(100_000_000, 2), 1).is_err());
        assert!(validate_book_fields("Dune", "Herbert", Decimal::ONE, -1).is_err());
    }

    #[test]
    fn search_terms_match_literally() {
        assert_eq!(contains_pattern("Dune"), "%dune%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("c:\\x"), "%c:\\\\x%");
    }
}
