pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod feed;
pub mod output;
pub mod store;
