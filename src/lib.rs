pub mod config;
pub mod constants;
pub mod mixer;
pub mod player;
