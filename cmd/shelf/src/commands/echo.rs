//! Echo command.

use clap::Args;

use crate::Cli;

/// Print the arguments back, separated by single spaces.
#[derive(Args)]
pub struct EchoCommand {
    /// Words to print
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl EchoCommand {
    pub fn run(&self, _cli: &Cli) -> anyhow::Result<()> {
        println!("{}", self.args.join(" "));
        Ok(())
    }
}
