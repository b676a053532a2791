pub mod audit_logs;
pub mod books;
pub mod cart_items;
pub mod categories;
pub mod contact_messages;
pub mod order_items;
pub mod orders;
pub mod payment_methods;
pub mod roles;
pub mod user_roles;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use books::Entity as Books;
pub use cart_items::Entity as CartItems;
pub use categories::Entity as Categories;
pub use contact_messages::Entity as ContactMessages;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_methods::Entity as PaymentMethods;
pub use roles::Entity as Roles;
pub use user_roles::Entity as UserRoles;
pub use users::Entity as Users;
