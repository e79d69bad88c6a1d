pub mod lifecycle;
pub mod repo;
pub mod sqlite;
