pub mod config;

pub mod db;
pub mod monitor;

pub mod notifications;
