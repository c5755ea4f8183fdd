pub mod agent;
pub mod audio;
pub mod boundary;
pub mod combat;
pub mod config;
pub mod constants;
pub mod engine;
pub mod entity;
pub mod error;
pub mod health;
pub mod locomotion;
pub mod phase;
pub mod player;
pub mod possession;
pub mod protocol;
pub mod rng;
pub mod spawn;
pub mod tasks;
pub mod types;
pub mod world;
