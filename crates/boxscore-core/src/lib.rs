// Shared foundation for the boxscore workspace: domain model, SQLite
// storage and configuration.

pub mod config;
pub mod db;
pub mod model;
