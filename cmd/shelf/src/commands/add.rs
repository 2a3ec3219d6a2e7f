//! Add commands.

use clap::{Args, Subcommand};

use shelf_library::{NewBook, NewUser, Tag};

use super::{open_library, print_success};
use crate::Cli;

/// Add a book or a user.
///
/// Multi-word titles and names may be given unquoted; the words are joined
/// by a single space. Each `-a` value is one author.
#[derive(Args)]
pub struct AddCommand {
    #[command(subcommand)]
    command: AddSubcommand,
}

#[derive(Subcommand)]
enum AddSubcommand {
    /// Add a book
    Book {
        /// Title
        #[arg(short = 't', long, required = true, num_args = 1..)]
        title: Vec<String>,
        /// Author (repeat for several authors)
        #[arg(short = 'a', long = "author", required = true)]
        authors: Vec<String>,
        /// ISBN, unique across books
        #[arg(short = 'i', long)]
        isbn: String,
        /// Page count
        #[arg(short = 'p', long)]
        pages: u32,
        /// Copies on the shelf
        #[arg(short = 'q', long, default_value_t = 1)]
        quantity: u32,
    },
    /// Add a user
    User {
        /// Full name
        #[arg(short = 'n', long, required = true, num_args = 1..)]
        name: Vec<String>,
        /// Username, unique across users
        #[arg(short = 'u', long)]
        username: String,
        /// Phone number
        #[arg(short = 'p', long)]
        phone: u64,
    },
}

impl AddCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            AddSubcommand::Book {
                title,
                authors,
                isbn,
                pages,
                quantity,
            } => {
                let book = NewBook::new(title.join(" "), authors.clone(), isbn, *pages, *quantity)?;
                let lib = open_library(cli)?;
                let id = lib.add_book(Tag::Add, &book)?;
                print_success(&format!("Added book \"{}\" with id {}", book.title, id));
                Ok(())
            }
            AddSubcommand::User {
                name,
                username,
                phone,
            } => {
                let user = NewUser::new(name.join(" "), username, *phone)?;
                let lib = open_library(cli)?;
                let id = lib.add_user(Tag::Add, &user)?;
                print_success(&format!("Added user \"{}\" with id {}", user.username, id));
                Ok(())
            }
        }
    }
}
