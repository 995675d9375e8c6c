// Library for tests to access modules

pub mod collector;
pub mod config;
pub mod emitter;
pub mod filter;
pub mod models;
pub mod monitor;
pub mod systemd_repo;
