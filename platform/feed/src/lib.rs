pub mod auth;
pub mod comment;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod fanout;
pub mod follow;
pub mod global;
pub mod live;
pub mod logging;
pub mod mention;
pub mod migration;
pub mod notification;
pub mod outbox;
pub mod pb;
pub mod push;
pub mod signal;
pub mod subscription;
pub mod users;
pub mod validation;

#[cfg(test)]
mod tests;
