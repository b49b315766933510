//! stashbox - content metadata service with request-scoped batched data access

pub mod app;
pub mod config;
pub mod db;
pub mod graphql;
pub mod loaders;
pub mod models;
pub mod user;
