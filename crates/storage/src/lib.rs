#![forbid(unsafe_code)]

pub mod file_store;
pub mod repository;
pub mod sqlite;
