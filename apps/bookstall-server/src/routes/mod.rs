//! Route modules for Bookstall Server

pub mod auth;
pub mod books;
pub mod cards;
pub mod health;
pub mod progress;
pub mod proxy;
