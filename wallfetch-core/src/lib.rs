pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;
pub mod paths;
pub mod phash;
pub mod pipeline;
pub mod quality;
pub mod ratelimit;
pub mod sources;
