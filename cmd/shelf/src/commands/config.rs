//! Configuration management commands.

use clap::{Args, Subcommand};

use shelf_cli::{Context as CliContext, Paths};
use shelf_library::Backend;

use super::{get_config, print_info, print_success, print_warning};
use crate::Cli;

/// Manage CLI configuration.
///
/// Contexts name a backend and a database file, similar to kubectl's
/// context management.
///
/// Configuration is stored in ~/.shelf/shelf/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add a new context
    #[command(name = "add-context")]
    AddContext {
        /// Context name
        name: String,
        /// Storage backend (kv, doc, graph)
        #[arg(long, default_value = "kv")]
        backend: String,
        /// Database file (default: ~/.shelf/shelf/data/<backend>.redb)
        #[arg(long)]
        path: Option<String>,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

impl ConfigCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext {
                name,
                backend,
                path,
            } => {
                let mut cfg = get_config(cli)?;
                let backend: Backend = backend.parse()?;

                let ctx = CliContext {
                    backend: backend.to_string(),
                    path: path.clone().unwrap_or_default(),
                    ..Default::default()
                };

                cfg.add_context(name, ctx)?;
                print_success(&format!("Context \"{}\" added successfully", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                let was_current = cfg.current_context == *name;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                if was_current {
                    print_warning("No current context set");
                }
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    print_info("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<20} {:<8} {}", "CURRENT", "NAME", "BACKEND", "PATH");

                for (name, ctx) in &cfg.contexts {
                    let current = if *name == cfg.current_context { "*" } else { "" };
                    let path = if ctx.path.is_empty() {
                        "(default)"
                    } else {
                        &ctx.path
                    };
                    println!("{:<8} {:<20} {:<8} {}", current, name, ctx.backend(), path);
                }

                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Contexts: {}", cfg.contexts.len());

                if !cfg.contexts.is_empty() {
                    println!("\nContext details:");
                    let paths = Paths::new(&cfg.app_name).ok();

                    for (name, ctx) in &cfg.contexts {
                        println!("\n  {}:", name);
                        println!("    Backend: {}", ctx.backend());
                        match &paths {
                            Some(paths) => {
                                println!("    Database: {}", ctx.db_path(paths).display())
                            }
                            None if !ctx.path.is_empty() => println!("    Database: {}", ctx.path),
                            None => {}
                        }
                    }
                }

                Ok(())
            }
        }
    }
}
