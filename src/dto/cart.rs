use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::CartEntry;

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub book_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartQuantityRequest {
    pub quantity: i32,
}

/// One cart line joined with the live state of its book.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub image_url: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub stock: i32,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartLine>,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
}

/// Outcome of a quantity edit. `applied` is false when the requested
/// quantity was outside `1..=stock` and the line was left untouched.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartQuantityUpdate {
    pub entry: CartEntry,
    pub applied: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveFromCartResult {
    pub removed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminCreateCartRequest {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminUpdateCartRequest {
    pub quantity: i32,
}

/// Cart entry as seen from the back office, with owner and book flattened in.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminCartLine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub book_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminCartList {
    pub items: Vec<AdminCartLine>,
}
