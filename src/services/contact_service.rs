use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    dto::contact::{ContactMessageList, SendMessageRequest},
    entity::contact_messages::{ActiveModel as MessageActive, Column as MessageCol, Entity as ContactMessages},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::ContactMessage,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub async fn send_message(
    state: &AppState,
    payload: SendMessageRequest,
) -> AppResult<ApiResponse<ContactMessage>> {
    let name = required("name", &payload.name)?;
    let email = required("email", &payload.email)?;
    let message = required("message", &payload.message)?;
    if !email.contains('@') {
        return Err(AppError::BadRequest("email is not valid".into()));
    }

    let saved = MessageActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        subject: Set(payload.subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())),
        message: Set(message),
        sent_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(message_id = %saved.id, "contact message received");

    Ok(ApiResponse::success(
        "Message sent",
        saved.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_messages(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ContactMessageList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let total = ContactMessages::find().count(&state.orm).await? as i64;
    let items = ContactMessages::find()
        .order_by_desc(MessageCol::SentAt)
        .order_by_desc(MessageCol::Id)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ContactMessage::from)
        .collect();

    Ok(ApiResponse::success(
        "Messages",
        ContactMessageList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
