use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        DeleteManyRequest, DeleteManyResult,
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{
            AddToCartRequest, AdminCartLine, AdminCartList, AdminCreateCartRequest,
            AdminUpdateCartRequest, CartLine, CartQuantityUpdate, CartView, RemoveFromCartResult,
            UpdateCartQuantityRequest,
        },
        catalog::{
            BookList, CategoryList, CategoryRequest, CreateBookRequest, DashboardStats,
            UpdateBookRequest,
        },
        contact::{ContactMessageList, SendMessageRequest},
        orders::{
            CheckoutRequest, OrderList, OrderWithItems, PaymentMethodList,
            UpdateOrderStatusRequest,
        },
        users::{CreateUserRequest, UpdateUserRequest, UserList},
    },
    models::{
        Book, CartEntry, Category, ContactMessage, Order, OrderItem, OrderStatus, PaymentMethod,
        User,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, books, cart, contact, health, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        books::list_books,
        books::get_book,
        books::list_categories,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_quantity,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::list_payment_methods,
        contact::send_message,
        admin::users::list_users,
        admin::users::get_user,
        admin::users::create_user,
        admin::users::update_user,
        admin::users::delete_users,
        admin::catalog::dashboard,
        admin::catalog::create_category,
        admin::catalog::update_category,
        admin::catalog::delete_categories,
        admin::catalog::create_book,
        admin::catalog::update_book,
        admin::catalog::delete_books,
        admin::catalog::list_low_stock,
        admin::carts::list_carts,
        admin::carts::create_cart,
        admin::carts::update_cart,
        admin::carts::delete_carts,
        admin::orders::list_all_orders,
        admin::orders::get_order_admin,
        admin::orders::update_order_status,
        admin::messages::list_messages
    ),
    components(
        schemas(
            User,
            Category,
            Book,
            CartEntry,
            Order,
            OrderItem,
            OrderStatus,
            PaymentMethod,
            ContactMessage,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AddToCartRequest,
            UpdateCartQuantityRequest,
            CartLine,
            CartView,
            CartQuantityUpdate,
            RemoveFromCartResult,
            AdminCreateCartRequest,
            AdminUpdateCartRequest,
            AdminCartLine,
            AdminCartList,
            CheckoutRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            PaymentMethodList,
            CreateBookRequest,
            UpdateBookRequest,
            CategoryRequest,
            BookList,
            CategoryList,
            DashboardStats,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            SendMessageRequest,
            ContactMessageList,
            DeleteManyRequest,
            DeleteManyResult,
            params::Pagination,
            params::BookQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Book>,
            ApiResponse<BookList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Books", description = "Public catalog"),
        (name = "Cart", description = "Shopping cart of the current user"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Contact", description = "Contact form"),
        (name = "Admin", description = "Back office, Admin role only"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
