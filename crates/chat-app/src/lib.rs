#![deny(unsafe_code)]

/// Application state: conversations, replies, calls and stories.
pub mod app;
/// Reply streaming contracts and the placeholder reducer.
pub mod chat;
pub mod navigation;
/// Call and story overlays with their timers.
pub mod overlay;
/// Settings persistence.
pub mod settings;
/// Line-oriented terminal front end.
pub mod shell;
