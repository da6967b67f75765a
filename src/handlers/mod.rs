//! HTTP 处理器模块

pub mod access;
pub mod audit;
pub mod auth;
pub mod health;
pub mod user;
