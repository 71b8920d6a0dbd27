// src/venue/mod.rs
pub mod client;
pub mod connection;
pub mod paper;

pub use client::{VenueClient, VenueError};
pub use connection::ConnectionManager;
pub use paper::PaperVenue;
