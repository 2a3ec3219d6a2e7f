//! Show commands.

use clap::{Args, Subcommand};

use shelf_library::Tag;

use super::{open_library, output_result};
use crate::Cli;

/// Show one book or user.
#[derive(Args)]
pub struct ShowCommand {
    #[command(subcommand)]
    command: ShowSubcommand,
}

#[derive(Subcommand)]
enum ShowSubcommand {
    /// Show a book by isbn
    Book { isbn: String },
    /// Show a user by username
    User { username: String },
}

impl ShowCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let lib = open_library(cli)?;
        match &self.command {
            ShowSubcommand::Book { isbn } => output_result(cli, &lib.get_book(Tag::Show, isbn)?),
            ShowSubcommand::User { username } => {
                output_result(cli, &lib.get_user(Tag::Show, username)?)
            }
        }
    }
}
