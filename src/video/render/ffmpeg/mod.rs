pub mod command;
pub mod compiler;
pub mod graph;
pub mod services;
