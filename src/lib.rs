pub mod api;
pub mod channels;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod presence;
pub mod state;
pub mod store;
pub mod transport;
