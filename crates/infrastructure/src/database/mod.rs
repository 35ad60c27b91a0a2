//! 持久层实现

pub mod sqlite;
