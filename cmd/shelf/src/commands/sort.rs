//! Sort commands.

use clap::{Args, Subcommand};

use shelf_library::{BookField, Tag, UserField};

use super::{open_library, output_result};
use crate::Cli;

/// List every book or user in ascending order of one field.
#[derive(Args)]
pub struct SortCommand {
    #[command(subcommand)]
    command: SortSubcommand,
}

#[derive(Subcommand)]
enum SortSubcommand {
    /// Sort books by title, authors, isbn, pages or quantity
    #[command(alias = "book")]
    Books {
        /// Field to sort by
        field: String,
    },
    /// Sort users by name, username or phone
    #[command(alias = "user")]
    Users {
        /// Field to sort by
        field: String,
    },
}

impl SortCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            SortSubcommand::Books { field } => {
                let field: BookField = field.parse()?;
                let books = open_library(cli)?.sort_books_by(Tag::Sort, field)?;
                output_result(cli, &books)
            }
            SortSubcommand::Users { field } => {
                let field: UserField = field.parse()?;
                let users = open_library(cli)?.sort_users_by(Tag::Sort, field)?;
                output_result(cli, &users)
            }
        }
    }
}
