pub mod access;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
