pub mod archive;
pub mod config;
pub mod error;
pub mod extensions;
pub mod fetch;
pub mod filesystem;
pub mod layout;
pub mod rebuild;
pub mod repository;
pub mod sanitize;

#[cfg(test)]
mod testing;
