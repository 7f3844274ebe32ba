//! Scrapes contacts, opportunities and tasks out of Close CRM pages and keeps
//! them in a local store.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod ident;
pub mod indicator;
pub mod model;
pub mod orchestrator;
pub mod page;
pub mod pagination;
pub mod parser;
pub mod store;

pub use error::{ExtractError, Result};
