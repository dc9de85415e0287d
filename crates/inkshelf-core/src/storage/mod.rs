mod folder_queries;
pub mod models;
mod queries;
mod series_queries;
mod sqlite;

pub use sqlite::Database;
