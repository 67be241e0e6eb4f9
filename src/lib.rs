pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ledger;
pub mod services;
pub mod timeline;
