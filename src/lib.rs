//! tvhound: feed-driven TV episode acquisition
//!
//! Polls indexer feeds, matches releases to known series, filters them by
//! quality policy and history, and hands accepted releases to a download
//! client. A backlog sweep turns missing episodes into season or episode
//! searches.

pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod jobs;
pub mod quality;
pub mod services;
