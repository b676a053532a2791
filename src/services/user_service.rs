use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        DeleteManyRequest, DeleteManyResult,
        users::{CreateUserRequest, UpdateUserRequest, UserList},
    },
    entity::{
        roles::{self, Column as RoleCol, Entity as Roles},
        user_roles::Column as UserRoleCol,
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::auth_service::{
        assign_role, clear_roles, ensure_identity_free, hash_password, role_id, role_names, to_user,
    },
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let total = Users::find().count(&state.orm).await? as i64;
    let users = Users::find()
        .order_by_asc(UserCol::Username)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let pairs: Vec<(Uuid, String)> = Roles::find()
        .select_only()
        .column(UserRoleCol::UserId)
        .column(RoleCol::Name)
        .join(JoinType::InnerJoin, roles::Relation::UserRoles.def())
        .filter(UserRoleCol::UserId.is_in(ids))
        .order_by_asc(RoleCol::Name)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let mut by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (user_id, name) in pairs {
        by_user.entry(user_id).or_default().push(name);
    }

    let items = users
        .into_iter()
        .map(|u| {
            let roles = by_user.remove(&u.id).unwrap_or_default();
            to_user(u, roles)
        })
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let found = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let roles = role_names(&state.orm, found.id).await?;
    Ok(ApiResponse::success("User", to_user(found, roles), None))
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_string();
    if username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "username, email and password are required".into(),
        ));
    }
    let password_hash = hash_password(&payload.password)?;

    let txn = state.orm.begin().await?;
    let role = role_id(&txn, &payload.role).await?;
    ensure_identity_free(&txn, &username, &email, None).await?;

    let created = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(&txn)
    .await?;
    assign_role(&txn, created.id, role).await?;
    let roles = role_names(&txn, created.id).await?;
    txn.commit().await?;

    tracing::info!(user_id = %created.id, role = %payload.role, "user created by admin");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_user_create",
        "users",
        serde_json::json!({ "user_id": created.id, "role": payload.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        to_user(created, roles),
        Some(Meta::empty()),
    ))
}

/// Edits identity fields, optionally resets the password and replaces the
/// user's role. A new password must be confirmed.
pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let new_password = payload.new_password.filter(|p| !p.is_empty());
    let password_hash = match new_password {
        Some(password) => {
            if payload.confirm_password.as_deref() != Some(password.as_str()) {
                return Err(AppError::BadRequest("passwords do not match".into()));
            }
            Some(hash_password(&password)?)
        }
        None => None,
    };

    let txn = state.orm.begin().await?;

    let existing = Users::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let username = payload
        .username
        .map(|u| u.trim().to_string())
        .unwrap_or_else(|| existing.username.clone());
    let email = payload
        .email
        .map(|e| e.trim().to_string())
        .unwrap_or_else(|| existing.email.clone());
    if username.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest("username and email cannot be blank".into()));
    }
    ensure_identity_free(&txn, &username, &email, Some(id)).await?;

    let role = match payload.role.as_deref() {
        Some(name) => Some(role_id(&txn, name).await?),
        None => None,
    };

    let mut active: UserActive = existing.into();
    active.username = Set(username);
    active.email = Set(email);
    if let Some(hash) = password_hash {
        active.password_hash = Set(hash);
    }
    let updated = active.update(&txn).await?;

    if let Some(role) = role {
        clear_roles(&txn, updated.id).await?;
        assign_role(&txn, updated.id, role).await?;
    }
    let roles = role_names(&txn, updated.id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_user_update",
        "users",
        serde_json::json!({ "user_id": updated.id, "role": payload.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        to_user(updated, roles),
        Some(Meta::empty()),
    ))
}

/// Deletes users; their roles, cart lines and orders go with them.
pub async fn delete_users(
    state: &AppState,
    user: &AuthUser,
    payload: DeleteManyRequest,
) -> AppResult<ApiResponse<DeleteManyResult>> {
    ensure_admin(user)?;
    if payload.ids.contains(&user.user_id) {
        return Err(AppError::BadRequest("cannot delete your own account".into()));
    }
    if payload.ids.is_empty() {
        return Ok(ApiResponse::success(
            "Nothing to delete",
            DeleteManyResult { deleted: 0 },
            Some(Meta::empty()),
        ));
    }

    let result = Users::delete_many()
        .filter(UserCol::Id.is_in(payload.ids.clone()))
        .exec(&state.orm)
        .await?;

    tracing::info!(deleted = result.rows_affected, "users deleted");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "admin_user_delete",
        "users",
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
