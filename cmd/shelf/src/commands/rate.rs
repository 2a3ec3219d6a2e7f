//! Rating command.

use clap::Args;

use shelf_library::{Score, Tag};

use super::{open_library, print_success};
use crate::Cli;

/// Rate a book from 1 to 5. Rating again replaces the earlier score.
#[derive(Args)]
pub struct RateCommand {
    /// Username of the rater
    username: String,
    /// ISBN of the book
    isbn: String,
    /// Score, 1 to 5
    score: String,
}

impl RateCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let score: Score = self.score.parse()?;
        let lib = open_library(cli)?;
        lib.rate(Tag::Rate, &self.username, &self.isbn, score)?;
        print_success(&format!(
            "{} rated {} with {}",
            self.username,
            self.isbn,
            score.get()
        ));
        Ok(())
    }
}
