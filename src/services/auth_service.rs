use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::{
        roles::{self, Column as RoleCol, Entity as Roles},
        user_roles::{self, ActiveModel as UserRoleActive, Column as UserRoleCol},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

const REMEMBER_ME_DAYS: i64 = 7;
const INVALID_LOGIN: &str = "Invalid username/email or password";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Role names held by a user, alphabetical.
pub async fn role_names<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Vec<String>> {
    let names = Roles::find()
        .select_only()
        .column(RoleCol::Name)
        .join(JoinType::InnerJoin, roles::Relation::UserRoles.def())
        .filter(UserRoleCol::UserId.eq(user_id))
        .order_by_asc(RoleCol::Name)
        .into_tuple::<String>()
        .all(conn)
        .await?;
    Ok(names)
}

/// Looks a role up by name; unknown names are a client error.
pub async fn role_id<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<i32> {
    Roles::find()
        .filter(RoleCol::Name.eq(name))
        .one(conn)
        .await?
        .map(|role| role.id)
        .ok_or_else(|| AppError::BadRequest(format!("unknown role '{name}'")))
}

pub async fn assign_role<C: ConnectionTrait>(conn: &C, user_id: Uuid, role_id: i32) -> AppResult<()> {
    UserRoleActive {
        user_id: Set(user_id),
        role_id: Set(role_id),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Rejects a username or email already taken by someone other than `except`.
pub async fn ensure_identity_free<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Users::find().filter(
        Condition::any()
            .add(UserCol::Username.eq(username))
            .add(UserCol::Email.eq(email)),
    );
    if let Some(id) = except {
        finder = finder.filter(UserCol::Id.ne(id));
    }
    if let Some(existing) = finder.one(conn).await? {
        let field = if existing.email == email { "Email" } else { "Username" };
        return Err(AppError::BadRequest(format!("{field} is already taken")));
    }
    Ok(())
}

pub fn to_user(model: UserModel, roles: Vec<String>) -> User {
    User {
        id: model.id,
        username: model.username,
        email: model.email,
        roles,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn default_username(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let email = payload.email.trim().to_string();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".into()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("email is not valid".into()));
    }
    let username = payload
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default_username(&email));
    if username.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }

    let password_hash = hash_password(&payload.password)?;

    let txn = state.orm.begin().await?;
    ensure_identity_free(&txn, &username, &email, None).await?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;
    let user_role = role_id(&txn, roles::USER).await?;
    assign_role(&txn, user.id, user_role).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        to_user(user, vec![roles::USER.to_string()]),
        None,
    ))
}

/// Signs a token for `user_id`. Returns the token and its expiry as a unix
/// timestamp.
pub fn issue_token(
    config: &AppConfig,
    user_id: Uuid,
    roles: Vec<String>,
    remember_me: bool,
) -> AppResult<(String, i64)> {
    let ttl = if remember_me {
        Duration::days(REMEMBER_ME_DAYS)
    } else {
        Duration::minutes(config.jwt_ttl_minutes)
    };
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        roles,
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok((token, expiration.timestamp()))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let login = payload.login.trim();
    let user = Users::find()
        .filter(
            Condition::any()
                .add(UserCol::Username.eq(login))
                .add(UserCol::Email.eq(login)),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_LOGIN.into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AppError::Unauthorized(INVALID_LOGIN.into()));
    }

    let roles = role_names(&state.orm, user.id).await?;
    let (token, expires_at) =
        issue_token(&state.config, user.id, roles.clone(), payload.remember_me)?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id, "remember_me": payload.remember_me }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            roles,
            expires_at,
        },
        Some(Meta::empty()),
    ))
}

/// Drops every role of `user_id`.
pub async fn clear_roles<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<()> {
    user_roles::Entity::delete_many()
        .filter(UserRoleCol::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    fn config(ttl: i64) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: "unit-secret".into(),
            jwt_ttl_minutes: ttl,
        }
    }

    #[test]
    fn username_defaults_to_email_local_part() {
        assert_eq!(default_username("ana@example.com"), "ana");
        assert_eq!(default_username("plain"), "plain");
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn token_round_trips_with_roles_and_expiry() {
        let cfg = config(30);
        let id = Uuid::new_v4();
        let now = Utc::now().timestamp();

        let (token, exp) = issue_token(&cfg, id, vec!["Admin".into()], false).unwrap();
        assert!((exp - now - 30 * 60).abs() <= 5);
        let caller = decode_token(&token, &cfg.jwt_secret).unwrap();
        assert_eq!(caller.user_id, id);
        assert!(caller.is_admin());

        let (_, long_exp) = issue_token(&cfg, id, vec![], true).unwrap();
        assert!((long_exp - now - REMEMBER_ME_DAYS * 24 * 3600).abs() <= 5);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let (token, _) = issue_token(&config(30), Uuid::new_v4(), vec![], false).unwrap();
        assert!(matches!(
            decode_token(&token, "another-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
