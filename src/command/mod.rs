// src/command/mod.rs
// Inbound command parsing

pub mod parser;
pub mod vocabulary;

pub use parser::{parse, parse_payload, parse_text};
