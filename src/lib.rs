// src/lib.rs
// Main library module declarations

pub mod command;
pub mod config;
pub mod domain;
pub mod service;
pub mod trading;
pub mod venue;
