pub mod analytics;
pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod models;
pub mod portal;
pub mod session;
pub mod storage;
pub mod targeting;
