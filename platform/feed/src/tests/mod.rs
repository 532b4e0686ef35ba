mod global;
mod migration;
mod notification;
mod transaction;
