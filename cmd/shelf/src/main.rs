//! shelf - library management from the command line.

use clap::{Parser, Subcommand};

mod commands;

use commands::{
    ActionCommand, AddCommand, ConfigCommand, EchoCommand, EditCommand, RateCommand,
    RemoveCommand, SearchCommand, ShowCommand, SortCommand, StatCommand, print_error,
};

/// shelf - keep track of books, users and loans.
///
/// The same commands work over three storage models:
///   - kv: hash records with secondary-index buckets
///   - doc: one document per book and per user
///   - graph: book, user and author nodes joined by edges
///
/// Configuration is stored in ~/.shelf/shelf/ and supports multiple contexts,
/// similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Library management CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.shelf/shelf/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Storage backend: kv, doc or graph (overrides the context)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Database file (overrides the context)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Add a book or a user
    Add(AddCommand),
    /// Change one field of a book or a user
    Edit(EditCommand),
    /// Remove a book or a user
    Remove(RemoveCommand),
    /// Find books or users by field
    Search(SearchCommand),
    /// List every book or user ordered by field
    Sort(SortCommand),
    /// Lend or return a book
    Action(ActionCommand),
    /// Show loan statistics
    Stat(StatCommand),
    /// Show one book or user
    Show(ShowCommand),
    /// Rate a book
    Rate(RateCommand),
    /// Print the arguments back
    Echo(EchoCommand),
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Config(cmd) => cmd.run(cli),
        Commands::Add(cmd) => cmd.run(cli),
        Commands::Edit(cmd) => cmd.run(cli),
        Commands::Remove(cmd) => cmd.run(cli),
        Commands::Search(cmd) => cmd.run(cli),
        Commands::Sort(cmd) => cmd.run(cli),
        Commands::Action(cmd) => cmd.run(cli),
        Commands::Stat(cmd) => cmd.run(cli),
        Commands::Show(cmd) => cmd.run(cli),
        Commands::Rate(cmd) => cmd.run(cli),
        Commands::Echo(cmd) => cmd.run(cli),
    }
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&cli) {
        print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;
    use shelf_kv::RedbStore;
    use shelf_library::{Backend, Tag};

    struct Env {
        _dir: tempfile::TempDir,
        config: String,
        db: String,
    }

    impl Env {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = dir.path().join("config.yaml").to_string_lossy().into_owned();
            let db = dir.path().join("lib.redb").to_string_lossy().into_owned();
            Self {
                _dir: dir,
                config,
                db,
            }
        }

        fn run(&self, backend: &str, args: &[&str]) -> anyhow::Result<()> {
            let mut argv = vec![
                "shelf",
                "--config",
                self.config.as_str(),
                "--db",
                self.db.as_str(),
                "--backend",
                backend,
            ];
            argv.extend_from_slice(args);
            let cli = Cli::try_parse_from(argv)?;
            run(&cli)
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_lend_and_return_flow() {
        for backend in ["kv", "doc", "graph"] {
            let env = Env::new();
            env.run(
                backend,
                &["add", "book", "-t", "Dune", "-a", "Frank Herbert", "-i", "111", "-p", "412", "-q", "2"],
            )
            .unwrap();
            env.run(backend, &["add", "user", "-n", "Al", "Smith", "-u", "al", "-p", "555"])
                .unwrap();
            env.run(backend, &["action", "take", "al", "111"]).unwrap();
            env.run(backend, &["action", "take", "al", "111"]).unwrap();

            let err = env.run(backend, &["action", "take", "al", "111"]).unwrap_err();
            assert!(err.to_string().contains("out of stock"), "{backend}: {err}");
            let err = env.run(backend, &["remove", "book", "111"]).unwrap_err();
            assert!(err.to_string().contains("loan"), "{backend}: {err}");

            env.run(backend, &["action", "give", "al", "111"]).unwrap();
            env.run(backend, &["action", "give", "al", "111"]).unwrap();
            env.run(backend, &["edit", "book", "111", "title", "Dune", "Messiah"]).unwrap();
            env.run(backend, &["rate", "al", "111", "4"]).unwrap();

            {
                let store = RedbStore::open(&env.db).unwrap();
                let lib = shelf_library::open(backend.parse::<Backend>().unwrap(), Box::new(store));
                let book = lib.get_book(Tag::Show, "111").unwrap();
                assert_eq!(book.title, "Dune Messiah");
                assert_eq!(book.quantity, 2);
                assert_eq!(lib.get_user(Tag::Show, "al").unwrap().name, "Al Smith");
                assert_eq!(lib.book_stats(Tag::Stat, "111").unwrap().ratings.count, 1);
            }

            env.run(backend, &["remove", "book", "111"]).unwrap();
        }
    }

    #[test]
    fn test_each_author_flag_is_one_author() {
        let env = Env::new();
        env.run(
            "kv",
            &[
                "add", "book", "-t", "Dune", "-a", "Brian Herbert", "-a", "Kevin Anderson", "-i",
                "111", "-p", "412",
            ],
        )
        .unwrap();
        {
            let store = RedbStore::open(&env.db).unwrap();
            let lib = shelf_library::open(Backend::Kv, Box::new(store));
            assert_eq!(
                lib.get_book(Tag::Show, "111").unwrap().authors,
                vec!["Brian Herbert".to_string(), "Kevin Anderson".to_string()]
            );
        }

        let unquoted = env.run(
            "kv",
            &["add", "book", "-t", "Emma", "-a", "Jane", "Austen", "-i", "222", "-p", "300"],
        );
        assert!(unquoted.is_err());
    }

    #[test]
    fn test_failures_are_errors() {
        let env = Env::new();
        let err = env.run("kv", &["search", "book", "title", "Dune"]).unwrap_err();
        assert_eq!(err.to_string(), "no match found");

        let err = env.run("kv", &["search", "book", "pages", "10"]).unwrap_err();
        assert!(err.to_string().contains("field"), "{err}");

        let err = env.run("kv", &["show", "user", "nobody"]).unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");

        let err = env.run("kv", &["rate", "al", "111", "6"]).unwrap_err();
        assert!(err.to_string().contains("score"), "{err}");

        assert!(env.run("sql", &["sort", "books", "title"]).is_err());
    }
}
