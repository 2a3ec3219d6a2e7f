//! CLI commands module.

mod action;
mod add;
mod config;
mod echo;
mod edit;
mod rate;
mod remove;
mod search;
mod show;
mod sort;
mod stat;
mod util;

pub use action::ActionCommand;
pub use add::AddCommand;
pub use config::ConfigCommand;
pub use echo::EchoCommand;
pub use edit::EditCommand;
pub use rate::RateCommand;
pub use remove::RemoveCommand;
pub use search::SearchCommand;
pub use show::ShowCommand;
pub use sort::SortCommand;
pub use stat::StatCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
