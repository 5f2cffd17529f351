//! API request handlers, one module per resource

pub mod activity;
pub mod admin;
pub mod auth;
pub mod budgets;
pub mod chat;
pub mod contacts;
pub mod dashboard;
pub mod departments;
pub mod employees;
pub mod files;
pub mod notifications;
pub mod projects;
pub mod resources;
pub mod tasks;
