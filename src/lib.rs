//! Goal Reflect: a guided class-participation goal check-in.

pub mod config;
pub mod demo;
pub mod error;
pub mod goal_bank;
pub mod llm;
pub mod reflection;
pub mod store;
