pub mod api;
pub mod app;
pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod pns;
pub mod reference;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod utils;
