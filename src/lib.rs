//! Memory capsule enhancement function, client service and capsule helpers.

pub mod action;
pub mod capsule;
pub mod config;
pub mod enhance;
pub mod function;
pub mod platform;
pub mod present;
pub mod provider;
pub mod realtime;
