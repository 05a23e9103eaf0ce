//! Media-to-audio conversion service for Telegram Mini Apps.
//!
//! Accepts an uploaded file or a remote URL from an authenticated Mini App
//! user, converts it to MP3 (optionally with embedded cover art) on a bounded
//! worker pool, and delivers the result to the user's chat through the Bot API.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
