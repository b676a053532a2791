//! Back-office endpoints. Every handler requires the `Admin` role; the check
//! happens in the service so it also holds for non-HTTP callers.

use axum::Router;

pub mod carts;
pub mod catalog;
pub mod messages;
pub mod orders;
pub mod users;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(catalog::router())
        .merge(carts::router())
        .merge(orders::router())
        .merge(messages::router())
}
