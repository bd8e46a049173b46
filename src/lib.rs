// Library for tests to access modules

pub mod accounts;
pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod csv;
pub mod error;
pub mod history_repo;
pub mod models;
pub mod poller;
pub mod report;
pub mod routes;
pub mod sensor_client;
pub mod session;
pub mod sinks;
pub mod version;
pub mod views;
