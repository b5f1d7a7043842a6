pub mod access;
pub mod files;
