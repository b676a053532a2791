use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    db::is_write_conflict,
    dto::orders::{
        CheckoutRequest, OrderList, OrderWithItems, PaymentMethodList, UpdateOrderStatusRequest,
    },
    entity::{
        cart_items::{self, Column as CartCol, Entity as CartItems},
        books::Column as BookCol,
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_methods::{Column as PaymentCol, Entity as PaymentMethods},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock,
    state::AppState,
};

/// How many times checkout runs in total before giving up on a conflict.
const CHECKOUT_ATTEMPTS: u32 = 2;

/// A cart line and the book it points at, read under lock at checkout.
#[derive(Debug, Clone, FromQueryResult)]
struct CheckoutLine {
    entry_id: Uuid,
    book_id: Uuid,
    quantity: i32,
    price: Decimal,
    stock: i32,
}

/// Turns the caller's cart into a pending order.
///
/// Validation and writes share one transaction. If the guarded stock
/// decrement misses or the database reports a write conflict, the attempt is
/// rolled back and the whole thing, validation included, runs once more.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    PaymentMethods::find_by_id(payload.payment_method_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let placed = retry_on_conflict(CHECKOUT_ATTEMPTS, |attempt| {
        if attempt > 1 {
            tracing::warn!(user_id = %user.user_id, attempt, "checkout conflict, retrying");
        }
        place_order(state, user.user_id, payload.payment_method_id)
    })
    .await?;

    tracing::info!(
        user_id = %user.user_id,
        order_id = %placed.order.id,
        total = %placed.order.total_amount,
        items = placed.items.len(),
        "order placed"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({
            "order_id": placed.order.id,
            "total_amount": placed.order.total_amount.to_string(),
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        placed,
        Some(Meta::empty()),
    ))
}

/// Runs `attempt` until it succeeds, fails with something other than
/// [`AppError::Conflict`], or `attempts` runs have been made.
async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut attempt: F) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut run = 1;
    loop {
        match attempt(run).await {
            Err(AppError::Conflict) if run < attempts => run += 1,
            other => return other,
        }
    }
}

/// One checkout attempt in its own transaction. Storage conflicts come back
/// as [`AppError::Conflict`].
async fn place_order(
    state: &AppState,
    user_id: Uuid,
    payment_method_id: i32,
) -> AppResult<OrderWithItems> {
    let txn = state.orm.begin().await.map_err(conflict_or_storage)?;

    match stage_order(&txn, user_id, payment_method_id).await {
        Ok(placed) => {
            txn.commit().await.map_err(conflict_or_storage)?;
            Ok(placed)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::warn!(error = %rollback_err, "checkout rollback failed");
            }
            Err(match err {
                AppError::OrmError(db_err) => conflict_or_storage(db_err),
                other => other,
            })
        }
    }
}

/// Reads and validates the cart under lock, then writes the order.
async fn stage_order(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    payment_method_id: i32,
) -> AppResult<OrderWithItems> {
    let lines = load_checkout_lines(txn, user_id).await?;
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }
    for line in &lines {
        stock::ensure_available(line.book_id, line.quantity, line.stock)?;
    }
    write_order(txn, user_id, payment_method_id, &lines).await
}

fn conflict_or_storage(err: sea_orm::DbErr) -> AppError {
    if is_write_conflict(&err) {
        AppError::Conflict
    } else {
        AppError::OrmError(err)
    }
}

async fn load_checkout_lines(
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> AppResult<Vec<CheckoutLine>> {
    let lines = CartItems::find()
        .select_only()
        .column_as(CartCol::Id, "entry_id")
        .column_as(CartCol::BookId, "book_id")
        .column_as(CartCol::Quantity, "quantity")
        .column_as(BookCol::Price, "price")
        .column_as(BookCol::Stock, "stock")
        .join(JoinType::InnerJoin, cart_items::Relation::Books.def())
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt)
        .order_by_asc(CartCol::Id)
        .lock(LockType::Update)
        .into_model::<CheckoutLine>()
        .all(txn)
        .await?;
    Ok(lines)
}

/// Writes the order, its item snapshots, the stock decrements and the cart
/// cleanup for already-validated `lines`. Returns `Conflict` as soon as a
/// guarded decrement finds less stock than the lines claim.
async fn write_order(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    payment_method_id: i32,
    lines: &[CheckoutLine],
) -> AppResult<OrderWithItems> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let total_amount: Decimal = lines
        .iter()
        .map(|line| stock::line_total(line.price, line.quantity))
        .sum();

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        payment_method_id: Set(payment_method_id),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            book_id: Set(line.book_id),
            quantity: Set(line.quantity),
            price_at_purchase: Set(line.price),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
        items.push(OrderItem::from(item));

        if !stock::take_stock(txn, line.book_id, line.quantity).await? {
            return Err(AppError::Conflict);
        }
    }

    let entry_ids: Vec<Uuid> = lines.iter().map(|line| line.entry_id).collect();
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::Id.is_in(entry_ids))
        .exec(txn)
        .await?;

    Ok(OrderWithItems {
        order: order.into(),
        items,
    })
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    paged_orders(state, condition, query).await
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    with_items(state, order).await
}

pub async fn list_payment_methods(state: &AppState) -> AppResult<ApiResponse<PaymentMethodList>> {
    let items = PaymentMethods::find()
        .order_by_asc(PaymentCol::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        PaymentMethodList { items },
        Some(Meta::empty()),
    ))
}

pub async fn admin_list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    paged_orders(state, Condition::all(), query).await
}

pub async fn admin_get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    with_items(state, order).await
}

/// Moves an order to the next status. Anything other than the immediate
/// successor, including the current status, is rejected.
pub async fn advance_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let from = order.status;
    if !from.can_advance_to(payload.status) {
        return Err(AppError::BadRequest(format!(
            "Order cannot move from {from:?} to {:?}",
            payload.status
        )));
    }

    let mut active: OrderActive = order.into();
    active.status = Set(payload.status);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, from = ?from, to = ?order.status, "order status advanced");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_status",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "from": format!("{from:?}"),
            "to": format!("{:?}", order.status),
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated",
        order.into(),
        Some(Meta::empty()),
    ))
}

async fn paged_orders(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

async fn with_items(
    state: &AppState,
    order: OrderModel,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        db::{create_orm_conn, run_migrations},
        entity::{books, categories, roles, user_roles, users},
    };

    async fn state() -> AppState {
        let orm = create_orm_conn("sqlite::memory:").await.expect("connect");
        run_migrations(&orm).await.expect("migrate");
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: "test-secret".into(),
            jwt_ttl_minutes: 30,
        };
        AppState::new(orm, config)
    }

    async fn seed_user(state: &AppState) -> Uuid {
        let id = Uuid::new_v4();
        users::ActiveModel {
            id: Set(id),
            username: Set(format!("u-{id}")),
            email: Set(format!("{id}@example.com")),
            password_hash: Set("x".into()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await
        .expect("user");
        user_roles::ActiveModel {
            user_id: Set(id),
            role_id: Set(roles::USER_ID),
        }
        .insert(&state.orm)
        .await
        .expect("role");
        id
    }

    async fn seed_book(state: &AppState, stock: i32) -> Uuid {
        let category_id = Uuid::new_v4();
        categories::ActiveModel {
            id: Set(category_id),
            name: Set(format!("cat-{category_id}")),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await
        .expect("category");
        let id = Uuid::new_v4();
        books::ActiveModel {
            id: Set(id),
            title: Set("Dune".into()),
            author: Set("Herbert".into()),
            description: Set(None),
            price: Set(Decimal::new(1000, 2)),
            stock: Set(stock),
            category_id: Set(category_id),
            image_url: Set(String::new()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await
        .expect("book");
        id
    }

    #[tokio::test]
    async fn one_conflict_is_retried() {
        let mut runs = Vec::new();
        let result = retry_on_conflict(CHECKOUT_ATTEMPTS, |run| {
            runs.push(run);
            async move {
                if run == 1 {
                    Err(AppError::Conflict)
                } else {
                    Ok("placed")
                }
            }
        })
        .await;

        assert!(matches!(result, Ok("placed")));
        assert_eq!(runs, vec![1, 2]);
    }

    #[tokio::test]
    async fn second_conflict_gives_up() {
        let mut runs = 0;
        let result: AppResult<()> = retry_on_conflict(CHECKOUT_ATTEMPTS, |_| {
            runs += 1;
            async { Err(AppError::Conflict) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict)));
        assert_eq!(runs, 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let mut runs = 0;
        let result: AppResult<()> = retry_on_conflict(CHECKOUT_ATTEMPTS, |_| {
            runs += 1;
            async { Err(AppError::EmptyCart) }
        })
        .await;

        assert!(matches!(result, Err(AppError::EmptyCart)));
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn stale_snapshot_rolls_back_with_conflict() {
        let state = state().await;
        let user_id = seed_user(&state).await;
        let book_id = seed_book(&state, 1).await;

        // Snapshot claims stock 3 and a quantity of 2, the row only holds 1.
        let stale = vec![CheckoutLine {
            entry_id: Uuid::new_v4(),
            book_id,
            quantity: 2,
            price: Decimal::new(1000, 2),
            stock: 3,
        }];

        let txn = state.orm.begin().await.expect("begin");
        let result = write_order(&txn, user_id, 1, &stale).await;
        assert!(matches!(result, Err(AppError::Conflict)));
        txn.rollback().await.expect("rollback");

        assert_eq!(Orders::find().count(&state.orm).await.expect("count"), 0);
        assert_eq!(OrderItems::find().count(&state.orm).await.expect("count"), 0);
        let book = books::Entity::find_by_id(book_id)
            .one(&state.orm)
            .await
            .expect("query")
            .expect("book");
        assert_eq!(book.stock, 1);
    }
}
