// CLI command handlers module
//
// Long-running: serve, worker
// One-shot: user, task, config

pub mod config_commands;
pub mod run_commands;
pub mod task_commands;
pub mod user_commands;
pub mod utils;

pub use config_commands::handle_config_command;
pub use run_commands::{handle_serve_command, handle_worker_command};
pub use task_commands::handle_task_command;
pub use user_commands::handle_user_command;
