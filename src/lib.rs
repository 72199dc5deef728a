pub mod catalog;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod history;
pub mod keyboard;
pub mod player;
pub mod prefs;
pub mod providers;
pub mod resolver;
pub mod route;
pub mod runtime;
pub mod storage;
pub mod switchboard;
pub mod types;
