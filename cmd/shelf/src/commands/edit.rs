//! Edit commands.

use clap::{Args, Subcommand};

use shelf_library::{BookEdit, BookField, Tag, UserEdit, UserField};

use super::{open_library, print_success};
use crate::Cli;

/// Change one field of a book or a user.
///
/// Books accept title, authors, pages and quantity; users accept name and
/// phone. Several values for authors replace the whole author list.
#[derive(Args)]
pub struct EditCommand {
    #[command(subcommand)]
    command: EditSubcommand,
}

#[derive(Subcommand)]
enum EditSubcommand {
    /// Edit a book
    Book {
        /// ISBN of the book
        isbn: String,
        /// Field to change
        field: String,
        /// New value
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },
    /// Edit a user
    User {
        /// Username of the user
        username: String,
        /// Field to change
        field: String,
        /// New value
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },
}

impl EditCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            EditSubcommand::Book {
                isbn,
                field,
                values,
            } => {
                let edit = BookEdit::parse(field.parse::<BookField>()?, values)?;
                let lib = open_library(cli)?;
                lib.edit_book(Tag::Edit, isbn, &edit)?;
                print_success(&format!("Updated {} of book {}", edit.field(), isbn));
                Ok(())
            }
            EditSubcommand::User {
                username,
                field,
                values,
            } => {
                let edit = UserEdit::parse(field.parse::<UserField>()?, values)?;
                let lib = open_library(cli)?;
                lib.edit_user(Tag::Edit, username, &edit)?;
                print_success(&format!("Updated {} of user {}", edit.field(), username));
                Ok(())
            }
        }
    }
}
