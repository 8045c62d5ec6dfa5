//! HTTP request handlers

pub mod api;
pub mod content;
pub mod health;
pub mod resource;
pub mod session;
