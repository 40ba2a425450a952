pub mod analysis;
pub mod api;
pub mod cli;
pub mod cli_handlers;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod polling;
pub mod query;
pub mod queue;
pub mod settings;
pub mod sql_constants;
pub mod tasks;
pub mod threads;
pub mod users;

#[cfg(test)]
pub mod test_utils;
