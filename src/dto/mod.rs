use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod contact;
pub mod orders;
pub mod users;

/// Bulk delete by id, as used by the back-office list screens.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteManyRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteManyResult {
    pub deleted: u64,
}
