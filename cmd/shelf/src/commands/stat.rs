//! Statistics commands.

use clap::{Args, Subcommand};

use shelf_library::Tag;

use super::{open_library, output_result};
use crate::Cli;

/// Show who borrows a book, or what a user holds.
///
/// Book statistics also carry the rating count and average.
#[derive(Args)]
pub struct StatCommand {
    #[command(subcommand)]
    command: StatSubcommand,
}

#[derive(Subcommand)]
enum StatSubcommand {
    /// Borrowers and ratings of a book
    Book {
        /// ISBN of the book
        isbn: String,
    },
    /// Books a user holds, with copy counts
    User {
        /// Username of the user
        username: String,
    },
}

impl StatCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let lib = open_library(cli)?;
        match &self.command {
            StatSubcommand::Book { isbn } => output_result(cli, &lib.book_stats(Tag::Stat, isbn)?),
            StatSubcommand::User { username } => {
                output_result(cli, &lib.user_stats(Tag::Stat, username)?)
            }
        }
    }
}
