//! light-merge - A GitLab bot that maintains merge trains.
//!
//! A merge train is an integration branch whose tip merges a set of feature
//! branches onto a base revision. Members are added and removed with `!lm`
//! notes on a GitLab issue; the bot rebuilds the integration commit, pushes
//! the train branch, and keeps the issue description up to date.
//!
//! The train's state lives in the integration commit's message, so the
//! branch is the only storage.

pub mod commands;
pub mod config;
pub mod git;
pub mod gitlab;
pub mod operator;
pub mod server;
pub mod status;
pub mod types;
pub mod view;

#[cfg(test)]
mod test_utils;
