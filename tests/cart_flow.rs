mod common;

use bookstore_api::{
    dto::{
        DeleteManyRequest,
        cart::{AddToCartRequest, AdminCreateCartRequest, AdminUpdateCartRequest},
    },
    error::AppError,
    routes::params::Pagination,
    services::cart_service,
};
use uuid::Uuid;

use common::{admin, book, cart_of, cents, customer, setup_state};

fn add(book_id: Uuid, quantity: i32) -> AddToCartRequest {
    AddToCartRequest { book_id, quantity }
}

#[tokio::test]
async fn repeat_adds_grow_the_line_and_cap_at_stock() {
    let state = setup_state().await;
    let user = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 3).await;

    let first = cart_service::add_to_cart(&state, &user, add(dune, 2)).await.unwrap();
    assert_eq!(first.data.unwrap().quantity, 2);

    let second = cart_service::add_to_cart(&state, &user, add(dune, 2)).await.unwrap();
    assert_eq!(second.message, "Quantity capped at available stock");
    assert_eq!(second.data.unwrap().quantity, 3);

    let lines = cart_of(&state, user.user_id).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
}

#[tokio::test]
async fn add_rejects_bad_input() {
    let state = setup_state().await;
    let user = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 3).await;

    let zero = cart_service::add_to_cart(&state, &user, add(dune, 0)).await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));

    let missing = cart_service::add_to_cart(&state, &user, add(Uuid::new_v4(), 1)).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    let too_many = cart_service::add_to_cart(&state, &user, add(dune, 4)).await;
    match too_many {
        Err(AppError::InsufficientStock {
            book_id,
            requested,
            available,
        }) => {
            assert_eq!(book_id, dune);
            assert_eq!(requested, 4);
            assert_eq!(available, 3);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert!(cart_of(&state, user.user_id).await.is_empty());
}

#[tokio::test]
async fn out_of_range_quantity_edit_is_a_noop() {
    let state = setup_state().await;
    let user = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 5).await;
    let entry = cart_service::add_to_cart(&state, &user, add(dune, 2))
        .await
        .unwrap()
        .data
        .unwrap();

    let zero = cart_service::update_quantity(&state, &user, entry.id, 0)
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(!zero.applied);
    assert_eq!(zero.entry.quantity, 2);

    let above_stock = cart_service::update_quantity(&state, &user, entry.id, 9)
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(!above_stock.applied);
    assert_eq!(cart_of(&state, user.user_id).await[0].quantity, 2);

    let ok = cart_service::update_quantity(&state, &user, entry.id, 4)
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(ok.applied);
    assert_eq!(cart_of(&state, user.user_id).await[0].quantity, 4);
}

#[tokio::test]
async fn entries_of_other_users_are_not_found() {
    let state = setup_state().await;
    let ana = customer(&state, "ana").await;
    let ben = customer(&state, "ben").await;
    let dune = book(&state, "Dune", 1000, 5).await;
    let bens = cart_service::add_to_cart(&state, &ben, add(dune, 1))
        .await
        .unwrap()
        .data
        .unwrap();

    let edit = cart_service::update_quantity(&state, &ana, bens.id, 2).await;
    assert!(matches!(edit, Err(AppError::NotFound)));

    let remove = cart_service::remove_from_cart(&state, &ana, bens.id).await;
    assert!(matches!(remove, Err(AppError::NotFound)));

    let remaining = cart_of(&state, ben.user_id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].quantity, 1);
}

#[tokio::test]
async fn removing_is_idempotent() {
    let state = setup_state().await;
    let user = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 5).await;
    let entry = cart_service::add_to_cart(&state, &user, add(dune, 1))
        .await
        .unwrap()
        .data
        .unwrap();

    let first = cart_service::remove_from_cart(&state, &user, entry.id).await.unwrap();
    assert!(first.data.unwrap().removed);

    let again = cart_service::remove_from_cart(&state, &user, entry.id).await.unwrap();
    assert!(!again.data.unwrap().removed);

    let never = cart_service::remove_from_cart(&state, &user, Uuid::new_v4()).await.unwrap();
    assert!(!never.data.unwrap().removed);
}

#[tokio::test]
async fn list_is_in_insertion_order_with_subtotal() {
    let state = setup_state().await;
    let user = customer(&state, "ana").await;
    let a = book(&state, "A", 1000, 5).await;
    let b = book(&state, "B", 250, 5).await;

    cart_service::add_to_cart(&state, &user, add(a, 2)).await.unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    cart_service::add_to_cart(&state, &user, add(b, 3)).await.unwrap();

    let view = cart_service::list_cart(&state, &user).await.unwrap().data.unwrap();
    let ids: Vec<Uuid> = view.items.iter().map(|line| line.book_id).collect();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(view.items[0].title, "A");
    assert_eq!(view.items[0].line_total, cents(2000));
    assert_eq!(view.items[1].stock, 5);
    assert_eq!(view.subtotal, cents(2750));
}

#[tokio::test]
async fn admin_manages_any_cart() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;
    let ana = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 4).await;

    let forbidden = cart_service::admin_list_carts(&state, &ana, Pagination::default()).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let request = |quantity| AdminCreateCartRequest {
        user_id: ana.user_id,
        book_id: dune,
        quantity,
    };

    let too_many = cart_service::admin_create_cart(&state, &boss, request(5)).await;
    assert!(matches!(too_many, Err(AppError::InsufficientStock { .. })));

    let created = cart_service::admin_create_cart(&state, &boss, request(2))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(created.user_id, ana.user_id);

    let duplicate = cart_service::admin_create_cart(&state, &boss, request(1)).await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    let listed = cart_service::admin_list_carts(&state, &boss, Pagination::default())
        .await
        .unwrap();
    assert_eq!(listed.meta.unwrap().total, Some(1));
    let line = &listed.data.unwrap().items[0];
    assert_eq!(line.username, "ana");
    assert_eq!(line.title, "Dune");

    let zero = cart_service::admin_update_cart(
        &state,
        &boss,
        created.id,
        AdminUpdateCartRequest { quantity: 0 },
    )
    .await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));

    let updated = cart_service::admin_update_cart(
        &state,
        &boss,
        created.id,
        AdminUpdateCartRequest { quantity: 4 },
    )
    .await
    .unwrap();
    assert_eq!(updated.data.unwrap().quantity, 4);

    let deleted = cart_service::admin_delete_carts(
        &state,
        &boss,
        DeleteManyRequest {
            ids: vec![created.id],
        },
    )
    .await
    .unwrap();
    assert_eq!(deleted.data.unwrap().deleted, 1);
    assert!(cart_of(&state, ana.user_id).await.is_empty());
}
