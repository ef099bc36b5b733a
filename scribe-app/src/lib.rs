pub mod app;
pub mod config;
pub mod dispatch;
pub mod generation;
