//! Application service layer - ledger sessions, auto-save, config

pub mod app;
pub mod config;
pub mod repository;
