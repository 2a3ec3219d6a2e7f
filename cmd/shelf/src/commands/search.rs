//! Search commands.

use clap::{Args, Subcommand};

use shelf_library::{BookField, BookQuery, Tag, UserField, UserQuery};

use super::{open_library, output_result, print_verbose};
use crate::Cli;

/// Find books or users by field.
///
/// Books are searched by title, authors or isbn; users by name, username or
/// phone. Several authors match books written by all of them. Finding
/// nothing is reported as a failure.
#[derive(Args)]
pub struct SearchCommand {
    #[command(subcommand)]
    command: SearchSubcommand,
}

#[derive(Subcommand)]
enum SearchSubcommand {
    /// Search books
    Book {
        /// Field to match
        field: String,
        /// Value to match
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },
    /// Search users
    User {
        /// Field to match
        field: String,
        /// Value to match
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },
}

impl SearchCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            SearchSubcommand::Book { field, values } => {
                let query = BookQuery::parse(field.parse::<BookField>()?, values)?;
                let lib = open_library(cli)?;
                let books = lib.find_books(Tag::Search, &query)?;
                print_verbose(cli, &format!("{} book(s) matched", books.len()));
                if books.is_empty() {
                    anyhow::bail!("no match found");
                }
                output_result(cli, &books)
            }
            SearchSubcommand::User { field, values } => {
                let query = UserQuery::parse(field.parse::<UserField>()?, values)?;
                let lib = open_library(cli)?;
                let users = lib.find_users(Tag::Search, &query)?;
                print_verbose(cli, &format!("{} user(s) matched", users.len()));
                if users.is_empty() {
                    anyhow::bail!("no match found");
                }
                output_result(cli, &users)
            }
        }
    }
}
