//! Remove commands.

use clap::{Args, Subcommand};

use shelf_library::Tag;

use super::{open_library, print_success};
use crate::Cli;

/// Remove a book or a user.
///
/// Books with copies on loan and users holding books are refused.
#[derive(Args)]
pub struct RemoveCommand {
    #[command(subcommand)]
    command: RemoveSubcommand,
}

#[derive(Subcommand)]
enum RemoveSubcommand {
    /// Remove a book
    Book {
        /// ISBN of the book
        isbn: String,
    },
    /// Remove a user
    User {
        /// Username of the user
        username: String,
    },
}

impl RemoveCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let lib = open_library(cli)?;
        match &self.command {
            RemoveSubcommand::Book { isbn } => {
                lib.remove_book(Tag::Remove, isbn)?;
                print_success(&format!("Removed book {}", isbn));
            }
            RemoveSubcommand::User { username } => {
                lib.remove_user(Tag::Remove, username)?;
                print_success(&format!("Removed user {}", username));
            }
        }
        Ok(())
    }
}
