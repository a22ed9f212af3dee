//! Compiled-in task definitions and the factory that registers them.

pub mod factory;
pub mod tasks;
