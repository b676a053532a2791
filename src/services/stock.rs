//! Stock rules shared by the cart and checkout paths.
//!
//! The pure functions decide; [`take_stock`] is the only place stock is ever
//! decremented and it refuses to go below zero at the database level.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, sea_query::Expr};
use uuid::Uuid;

use crate::{
    entity::books::{Column as BookCol, Entity as Books},
    error::{AppError, AppResult},
};

pub fn ensure_available(book_id: Uuid, requested: i32, available: i32) -> AppResult<()> {
    if requested > available {
        return Err(AppError::InsufficientStock {
            book_id,
            requested,
            available,
        });
    }
    Ok(())
}

/// Quantity of an existing cart line after adding `adding` more, capped at
/// the book's current stock.
pub fn clamp_to_stock(current: i32, adding: i32, stock: i32) -> i32 {
    current.saturating_add(adding).min(stock)
}

/// Whether an explicit quantity edit may be applied. Edits outside
/// `1..=stock` leave the line as it is.
pub fn accepts_quantity(quantity: i32, stock: i32) -> bool {
    quantity >= 1 && quantity <= stock
}

pub fn line_total(price: Decimal, quantity: i32) -> Decimal {
    price * Decimal::from(quantity)
}

/// Decrements stock by `quantity` only if at least that much is left.
/// Returns `false` when the guard rejected the update, i.e. someone else
/// consumed the stock after it was read.
pub async fn take_stock<C: ConnectionTrait>(
    conn: &C,
    book_id: Uuid,
    quantity: i32,
) -> AppResult<bool> {
    let result = Books::update_many()
        .col_expr(BookCol::Stock, Expr::col(BookCol::Stock).sub(quantity))
        .filter(BookCol::Id.eq(book_id))
        .filter(BookCol::Stock.gte(quantity))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_is_inclusive() {
        let id = Uuid::new_v4();
        assert!(ensure_available(id, 2, 2).is_ok());
        assert!(ensure_available(id, 0, 0).is_ok());
        match ensure_available(id, 3, 1) {
            Err(AppError::InsufficientStock {
                book_id,
                requested,
                available,
            }) => {
                assert_eq!(book_id, id);
                assert_eq!(requested, 3);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeat_adds_are_capped_at_stock() {
        assert_eq!(clamp_to_stock(1, 1, 5), 2);
        assert_eq!(clamp_to_stock(4, 3, 5), 5);
        assert_eq!(clamp_to_stock(7, 1, 5), 5);
        assert_eq!(clamp_to_stock(i32::MAX, 1, 5), 5);
    }

    #[test]
    fn quantity_edits_must_fit_stock() {
        assert!(accepts_quantity(1, 1));
        assert!(accepts_quantity(3, 5));
        assert!(!accepts_quantity(0, 5));
        assert!(!accepts_quantity(-2, 5));
        assert!(!accepts_quantity(6, 5));
    }

    #[test]
    fn line_total_multiplies_exactly() {
        assert_eq!(line_total(Decimal::new(1999, 2), 3), Decimal::new(5997, 2));
        assert_eq!(line_total(Decimal::new(500, 2), 0), Decimal::ZERO);
    }
}
