// Re-export modules
pub mod api;
pub mod biometrics;
pub mod config;
pub mod db;
pub mod models;
pub mod security;
pub mod utils;
