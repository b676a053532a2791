#![allow(dead_code)]

use bookstore_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        books::{ActiveModel as BookActive, Entity as Books},
        cart_items::{Column as CartCol, Entity as CartItems, Model as CartModel},
        categories::ActiveModel as CategoryActive,
        roles,
        user_roles::ActiveModel as UserRoleActive,
        users::ActiveModel as UserActive,
    },
    middleware::auth::AuthUser,
    state::AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret";

/// Fresh in-memory database with every migration applied.
pub async fn setup_state() -> AppState {
    let url = "sqlite::memory:";
    let orm = create_orm_conn(url).await.expect("connect sqlite");
    run_migrations(&orm).await.expect("run migrations");
    AppState::new(
        orm,
        AppConfig {
            database_url: url.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: JWT_SECRET.to_string(),
            jwt_ttl_minutes: 30,
        },
    )
}

async fn insert_user(state: &AppState, username: &str, role_id: i32) -> Uuid {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        password_hash: Set("not-a-real-hash".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert user");
    UserRoleActive {
        user_id: Set(id),
        role_id: Set(role_id),
    }
    .insert(&state.orm)
    .await
    .expect("insert user role");
    id
}

pub async fn customer(state: &AppState, username: &str) -> AuthUser {
    AuthUser {
        user_id: insert_user(state, username, roles::USER_ID).await,
        roles: vec![roles::USER.to_string()],
    }
}

pub async fn admin(state: &AppState, username: &str) -> AuthUser {
    AuthUser {
        user_id: insert_user(state, username, roles::ADMIN_ID).await,
        roles: vec![roles::ADMIN.to_string()],
    }
}

pub async fn category(state: &AppState, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    CategoryActive {
        id: Set(id),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert category");
    id
}

/// Inserts a book priced at `cents / 100` in its own category.
pub async fn book(state: &AppState, title: &str, cents: i64, stock: i32) -> Uuid {
    let category_id = category(state, &format!("{title} shelf")).await;
    let id = Uuid::new_v4();
    BookActive {
        id: Set(id),
        title: Set(title.to_string()),
        author: Set("Test Author".to_string()),
        description: Set(None),
        price: Set(Decimal::new(cents, 2)),
        stock: Set(stock),
        category_id: Set(category_id),
        image_url: Set(String::new()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await
    .expect("insert book");
    id
}

pub async fn stock_of(state: &AppState, book_id: Uuid) -> i32 {
    Books::find_by_id(book_id)
        .one(&state.orm)
        .await
        .expect("query book")
        .expect("book exists")
        .stock
}

pub async fn cart_of(state: &AppState, user_id: Uuid) -> Vec<CartModel> {
    CartItems::find()
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&state.orm)
        .await
        .expect("query cart")
}

pub fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}
