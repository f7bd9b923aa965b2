pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
