#![deny(unsafe_code)]

pub mod chat;
pub mod cli;
pub mod content;
pub mod markdown;
pub mod render;
pub mod settings;
