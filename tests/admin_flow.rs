mod common;

use bookstore_api::{
    dto::{
        DeleteManyRequest,
        cart::AddToCartRequest,
        catalog::{CategoryRequest, CreateBookRequest, UpdateBookRequest},
        contact::SendMessageRequest,
        orders::CheckoutRequest,
        users::{CreateUserRequest, UpdateUserRequest},
    },
    error::AppError,
    routes::params::{BookQuery, BookSortBy, LowStockQuery, Pagination, SortOrder},
    services::{cart_service, catalog_service, contact_service, order_service, user_service},
};
use uuid::Uuid;

use common::{admin, book, cart_of, category, cents, customer, setup_state};

fn new_book(title: &str, category_id: Uuid, price: rust_decimal::Decimal, stock: i32) -> CreateBookRequest {
    CreateBookRequest {
        title: title.to_string(),
        author: "Frank Herbert".to_string(),
        description: Some("Spice".to_string()),
        price,
        stock,
        category_id,
        image_url: None,
    }
}

#[tokio::test]
async fn customers_are_kept_out_of_the_back_office() {
    let state = setup_state().await;
    let ana = customer(&state, "ana").await;
    let shelf = category(&state, "Fiction").await;

    assert!(matches!(
        catalog_service::dashboard(&state, &ana).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        catalog_service::create_book(&state, &ana, new_book("Dune", shelf, cents(1000), 1)).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        user_service::list_users(&state, &ana, Pagination::default()).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        contact_service::list_messages(&state, &ana, Pagination::default()).await,
        Err(AppError::Forbidden)
    ));
}

#[tokio::test]
async fn books_are_validated_and_searchable() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;
    let shelf = category(&state, "Fiction").await;

    let blank = catalog_service::create_book(&state, &boss, new_book(" ", shelf, cents(100), 1)).await;
    assert!(matches!(blank, Err(AppError::BadRequest(_))));
    let pricey = catalog_service::create_book(
        &state,
        &boss,
        new_book("Gold", shelf, cents(100_000_000), 1),
    )
    .await;
    assert!(matches!(pricey, Err(AppError::BadRequest(_))));
    let negative = catalog_service::create_book(&state, &boss, new_book("Neg", shelf, cents(100), -1)).await;
    assert!(matches!(negative, Err(AppError::BadRequest(_))));
    let orphan = catalog_service::create_book(
        &state,
        &boss,
        new_book("Orphan", Uuid::new_v4(), cents(100), 1),
    )
    .await;
    assert!(matches!(orphan, Err(AppError::BadRequest(_))));

    let dune = catalog_service::create_book(&state, &boss, new_book("Dune", shelf, cents(1299), 4))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(dune.category_name, "Fiction");
    catalog_service::create_book(&state, &boss, new_book("Emma", shelf, cents(899), 2))
        .await
        .unwrap();

    let search = BookQuery {
        q: Some("DUN".to_string()),
        ..Default::default()
    };
    let found = catalog_service::list_books(&state, search).await.unwrap();
    assert_eq!(found.meta.unwrap().total, Some(1));
    assert_eq!(found.data.unwrap().items[0].id, dune.id);

    let by_author = BookQuery {
        q: Some("herbert".to_string()),
        category_id: Some(shelf),
        sort_by: Some(BookSortBy::Price),
        sort_order: Some(SortOrder::Asc),
        ..Default::default()
    };
    let titles: Vec<String> = catalog_service::list_books(&state, by_author)
        .await
        .unwrap()
        .data
        .unwrap()
        .items
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["Emma", "Dune"]);

    for wildcard in ["%", "_", "\\"] {
        let literal = BookQuery {
            q: Some(wildcard.to_string()),
            ..Default::default()
        };
        let found = catalog_service::list_books(&state, literal).await.unwrap();
        assert_eq!(found.meta.unwrap().total, Some(0), "search for {wildcard:?}");
    }

    let far_page = BookQuery {
        page: Some(i64::MAX),
        per_page: Some(100),
        ..Default::default()
    };
    let beyond = catalog_service::list_books(&state, far_page).await.unwrap();
    assert_eq!(beyond.meta.unwrap().total, Some(2));
    assert!(beyond.data.unwrap().items.is_empty());

    let detail = catalog_service::get_book(&state, dune.id).await.unwrap().data.unwrap();
    assert_eq!(detail.price, cents(1299));
    assert!(matches!(
        catalog_service::get_book(&state, Uuid::new_v4()).await,
        Err(AppError::NotFound)
    ));
}

#[tokio::test]
async fn categories_in_use_cannot_be_deleted() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;

    let poetry = catalog_service::create_category(
        &state,
        &boss,
        CategoryRequest {
            name: "Poetry".to_string(),
        },
    )
    .await
    .unwrap()
    .data
    .unwrap();
    let duplicate = catalog_service::create_category(
        &state,
        &boss,
        CategoryRequest {
            name: "Poetry".to_string(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    let renamed = catalog_service::update_category(
        &state,
        &boss,
        poetry.id,
        CategoryRequest {
            name: "Verse".to_string(),
        },
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(renamed.name, "Verse");

    catalog_service::create_book(&state, &boss, new_book("Odes", poetry.id, cents(500), 1))
        .await
        .unwrap();

    let blocked = catalog_service::delete_categories(
        &state,
        &boss,
        DeleteManyRequest {
            ids: vec![poetry.id],
        },
    )
    .await;
    assert!(matches!(blocked, Err(AppError::BadRequest(_))));

    let empty_shelf = category(&state, "Empty").await;
    let deleted = catalog_service::delete_categories(
        &state,
        &boss,
        DeleteManyRequest {
            ids: vec![empty_shelf],
        },
    )
    .await
    .unwrap();
    assert_eq!(deleted.data.unwrap().deleted, 1);

    let names: Vec<String> = catalog_service::list_categories(&state)
        .await
        .unwrap()
        .data
        .unwrap()
        .items
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Verse"]);
}

#[tokio::test]
async fn ordered_books_cannot_be_deleted() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;
    let ana = customer(&state, "ana").await;
    let sold = book(&state, "Sold", 1000, 5).await;
    let unsold = book(&state, "Unsold", 1000, 5).await;

    cart_service::add_to_cart(&state, &ana, AddToCartRequest { book_id: sold, quantity: 1 })
        .await
        .unwrap();
    order_service::checkout(&state, &ana, CheckoutRequest { payment_method_id: 1 })
        .await
        .unwrap();
    cart_service::add_to_cart(&state, &ana, AddToCartRequest { book_id: unsold, quantity: 1 })
        .await
        .unwrap();

    let blocked = catalog_service::delete_books(&state, &boss, DeleteManyRequest { ids: vec![sold] }).await;
    assert!(matches!(blocked, Err(AppError::BadRequest(_))));

    let deleted = catalog_service::delete_books(&state, &boss, DeleteManyRequest { ids: vec![unsold] })
        .await
        .unwrap();
    assert_eq!(deleted.data.unwrap().deleted, 1);
    assert!(cart_of(&state, ana.user_id).await.is_empty());
}

#[tokio::test]
async fn low_stock_and_dashboard() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;
    customer(&state, "ana").await;
    let scarce = book(&state, "Scarce", 1000, 1).await;
    let few = book(&state, "Few", 1000, 4).await;
    let plenty = book(&state, "Plenty", 1000, 50).await;

    let low = catalog_service::list_low_stock(&state, &boss, LowStockQuery::default())
        .await
        .unwrap()
        .data
        .unwrap();
    let ids: Vec<Uuid> = low.items.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![scarce, few]);

    catalog_service::update_book(
        &state,
        &boss,
        plenty,
        UpdateBookRequest {
            stock: Some(0),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let strict = LowStockQuery {
        threshold: Some(1),
        ..Default::default()
    };
    let low = catalog_service::list_low_stock(&state, &boss, strict).await.unwrap();
    assert_eq!(low.meta.unwrap().total, Some(2));

    contact_service::send_message(
        &state,
        SendMessageRequest {
            name: "Visitor".to_string(),
            email: "visitor@example.com".to_string(),
            subject: None,
            message: "Do you ship abroad?".to_string(),
        },
    )
    .await
    .unwrap();

    let stats = catalog_service::dashboard(&state, &boss).await.unwrap().data.unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.books, 3);
    assert_eq!(stats.categories, 3);
    assert_eq!(stats.orders, 0);
    assert_eq!(stats.cart_entries, 0);
    assert_eq!(stats.contact_messages, 1);
}

#[tokio::test]
async fn admin_user_lifecycle() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;

    let request = |role: &str| CreateUserRequest {
        username: "clerk".to_string(),
        email: "clerk@example.com".to_string(),
        password: "pass1234".to_string(),
        role: role.to_string(),
    };

    let unknown_role = user_service::create_user(&state, &boss, request("Owner")).await;
    assert!(matches!(unknown_role, Err(AppError::BadRequest(_))));

    let clerk = user_service::create_user(&state, &boss, request("User"))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(clerk.roles, vec!["User"]);

    let again = user_service::create_user(&state, &boss, request("User")).await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    let mismatch = user_service::update_user(
        &state,
        &boss,
        clerk.id,
        UpdateUserRequest {
            new_password: Some("new-pass".to_string()),
            confirm_password: Some("other".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(mismatch, Err(AppError::BadRequest(_))));

    let promoted = user_service::update_user(
        &state,
        &boss,
        clerk.id,
        UpdateUserRequest {
            username: Some("head-clerk".to_string()),
            new_password: Some("new-pass".to_string()),
            confirm_password: Some("new-pass".to_string()),
            role: Some("Admin".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(promoted.username, "head-clerk");
    assert_eq!(promoted.roles, vec!["Admin"]);

    let listed = user_service::list_users(&state, &boss, Pagination::default())
        .await
        .unwrap();
    assert_eq!(listed.meta.unwrap().total, Some(2));
    let listed_clerk = listed
        .data
        .unwrap()
        .items
        .into_iter()
        .find(|u| u.id == clerk.id)
        .unwrap();
    assert_eq!(listed_clerk.roles, vec!["Admin"]);

    let fetched = user_service::get_user(&state, &boss, clerk.id).await.unwrap().data.unwrap();
    assert_eq!(fetched.email, "clerk@example.com");

    let self_delete = user_service::delete_users(
        &state,
        &boss,
        DeleteManyRequest {
            ids: vec![boss.user_id],
        },
    )
    .await;
    assert!(matches!(self_delete, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn deleting_a_user_removes_their_cart() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;
    let ana = customer(&state, "ana").await;
    let dune = book(&state, "Dune", 1000, 5).await;
    cart_service::add_to_cart(&state, &ana, AddToCartRequest { book_id: dune, quantity: 2 })
        .await
        .unwrap();

    let deleted = user_service::delete_users(
        &state,
        &boss,
        DeleteManyRequest {
            ids: vec![ana.user_id],
        },
    )
    .await
    .unwrap();
    assert_eq!(deleted.data.unwrap().deleted, 1);
    assert!(cart_of(&state, ana.user_id).await.is_empty());
    assert!(matches!(
        user_service::get_user(&state, &boss, ana.user_id).await,
        Err(AppError::NotFound)
    ));
}

#[tokio::test]
async fn contact_messages_reach_the_inbox() {
    let state = setup_state().await;
    let boss = admin(&state, "boss").await;

    let blank = contact_service::send_message(
        &state,
        SendMessageRequest {
            name: "Visitor".to_string(),
            email: "visitor@example.com".to_string(),
            subject: None,
            message: "   ".to_string(),
        },
    )
    .await;
    assert!(matches!(blank, Err(AppError::BadRequest(_))));

    for subject in ["first", "second"] {
        contact_service::send_message(
            &state,
            SendMessageRequest {
                name: "Visitor".to_string(),
                email: "visitor@example.com".to_string(),
                subject: Some(subject.to_string()),
                message: "Hello".to_string(),
            },
        )
        .await
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let inbox = contact_service::list_messages(&state, &boss, Pagination::default())
        .await
        .unwrap()
        .data
        .unwrap();
    let subjects: Vec<Option<String>> = inbox.items.into_iter().map(|m| m.subject).collect();
    assert_eq!(
        subjects,
        vec![Some("second".to_string()), Some("first".to_string())]
    );
}
