use bookstore_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        books::{ActiveModel as BookActive, Column as BookCol, Entity as Books},
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        roles,
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    services::auth_service::{assign_role, hash_password, role_id},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin", "admin@example.com", "admin123", roles::ADMIN).await?;
    let user_id = ensure_user(&orm, "reader", "reader@example.com", "reader123", roles::USER).await?;
    seed_catalog(&orm).await?;

    tracing::info!(%admin_id, %user_id, "seed completed");
    Ok(())
}

async fn ensure_user(
    orm: &OrmConn,
    username: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        tracing::info!(email, "user already present");
        return Ok(existing.id);
    }

    let password_hash = hash_password(password)?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;

    let role_pk = role_id(orm, role).await?;
    assign_role(orm, user.id, role_pk).await?;

    tracing::info!(email, role, "user created");
    Ok(user.id)
}

async fn ensure_category(orm: &OrmConn, name: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = Categories::find()
        .filter(CategoryCol::Name.eq(name))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(category.id)
}

async fn seed_catalog(orm: &OrmConn) -> anyhow::Result<()> {
    // (category, title, author, price in cents, stock)
    let books = [
        ("Fiction", "Dune", "Frank Herbert", 1299, 12),
        ("Fiction", "The Left Hand of Darkness", "Ursula K. Le Guin", 1099, 8),
        ("Programming", "The Rust Programming Language", "Steve Klabnik", 3999, 20),
        ("Programming", "Zero To Production In Rust", "Luca Palmieri", 4500, 3),
        ("History", "SPQR", "Mary Beard", 1850, 5),
    ];

    for (category, title, author, cents, stock) in books {
        let category_id = ensure_category(orm, category).await?;
        let exists = Books::find()
            .filter(BookCol::Title.eq(title))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        BookActive {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            author: Set(author.to_string()),
            description: Set(None),
            price: Set(Decimal::new(cents, 2)),
            stock: Set(stock),
            category_id: Set(category_id),
            image_url: Set(String::new()),
            created_at: Set(Utc::now().into()),
        }
        .insert(orm)
        .await?;
    }

    tracing::info!("catalog seeded");
    Ok(())
}
