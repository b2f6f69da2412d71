pub mod config;
pub mod context;
pub mod export;
pub mod logs;
pub mod project;
pub mod storage;
