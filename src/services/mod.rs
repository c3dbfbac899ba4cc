pub mod database;
pub mod sqlite_database;
#[cfg(test)]
pub mod mock_database;

pub use database::DatabaseService;
pub use sqlite_database::SqliteDatabaseService;
