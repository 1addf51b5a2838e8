pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod models;
pub mod resume_parser;
pub mod routes;
pub mod schema;
pub mod state;
pub mod validation;
pub mod views;
