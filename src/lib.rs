pub mod config;
pub mod ledger;
pub mod observability;
pub mod service;
