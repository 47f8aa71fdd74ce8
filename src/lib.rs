#![forbid(unsafe_code)]

pub mod api;
pub mod assets;
pub mod config;
pub mod models;
pub mod object_id;
pub mod store;
