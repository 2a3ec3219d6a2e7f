//! Loan commands.

use clap::{Args, Subcommand};

use shelf_library::Tag;

use super::{open_library, output_result, print_info, print_success};
use crate::Cli;

/// Lend a book to a user or take it back.
#[derive(Args)]
pub struct ActionCommand {
    #[command(subcommand)]
    command: ActionSubcommand,
}

#[derive(Subcommand)]
enum ActionSubcommand {
    /// Lend one copy of a book to a user
    #[command(alias = "checkout")]
    Take {
        /// Username of the borrower
        username: String,
        /// ISBN of the book
        isbn: String,
    },
    /// Return one copy of a book from a user
    #[command(alias = "checkin")]
    Give {
        /// Username of the borrower
        username: String,
        /// ISBN of the book
        isbn: String,
    },
}

impl ActionCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let lib = open_library(cli)?;
        match &self.command {
            ActionSubcommand::Take { username, isbn } => {
                let loan = lib.checkout(Tag::Action, username, isbn)?;
                print_success(&format!("{} borrowed {}", username, isbn));
                output_result(cli, &loan)
            }
            ActionSubcommand::Give { username, isbn } => {
                let loan = lib.checkin(Tag::Action, username, isbn)?;
                print_success(&format!("{} returned {}", username, isbn));
                if loan.count == 0 {
                    print_info("Loan closed");
                }
                output_result(cli, &loan)
            }
        }
    }
}
