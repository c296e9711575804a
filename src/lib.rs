//! relay: take a coding task from chat, run an agent against a local
//! checkout, and ship the result as a pull request.

pub mod agent;
pub mod branch;
pub mod chat;
pub mod config;
pub mod errors;
pub mod git;
pub mod github;
pub mod progress;
pub mod server;
pub mod session;
pub mod stream;
pub mod task;
pub mod workflow;

#[cfg(test)]
mod testutil;
