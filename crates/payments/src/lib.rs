pub mod doku_client;
pub mod models;
pub mod sanitize;
pub mod signature;

mod gateway;
