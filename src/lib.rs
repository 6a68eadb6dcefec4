// lib.rs
pub mod anchor;
pub mod collinear;
pub mod coords;
pub mod engine;
pub mod error;
pub mod pwaln;
pub mod store;

mod batch;
