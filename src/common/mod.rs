//! Configuration, receiver tables and result persistence.

pub mod config;
pub mod radio_tables;
pub mod results;
