//! News briefing generator.
//!
//! Collects RSS/Atom feeds, clusters related entries into topics, scrapes and
//! summarizes the articles behind them and renders a briefing page. The steps are
//! tasks of a YAML defined workflow run by [`core::WorkflowHandler`].

pub mod config;
pub mod constants;
pub mod core;
pub mod db;
pub mod errors;
pub mod llm;
pub mod schema;
pub mod tasks;
pub mod utils;
