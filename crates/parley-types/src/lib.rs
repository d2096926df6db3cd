pub mod api;
pub mod models;

mod b64;
