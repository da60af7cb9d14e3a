// Library exports for Torget
// This allows integration tests and external code to use Torget modules

pub mod ads;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod humanize;
pub mod routes;
pub mod state;
pub mod uploads;
