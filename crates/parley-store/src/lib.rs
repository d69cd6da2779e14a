pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Store;
pub use error::StoreError;
pub use models::*;
