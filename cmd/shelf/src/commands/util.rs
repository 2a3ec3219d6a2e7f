//! Utility functions for CLI commands.

use std::path::PathBuf;

use shelf_cli::{Config, Context, Output, OutputFormat, Paths, load_config};
use shelf_kv::RedbStore;
use shelf_library::{Backend, Library};

use crate::Cli;

const APP_NAME: &str = "shelf";

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Gets the context configuration to use.
///
/// Without `-c` and without a current context, an unnamed default context
/// is returned so the tool works before any configuration exists.
pub fn get_context(cli: &Cli) -> anyhow::Result<Context> {
    let cfg = get_config(cli)?;

    match cfg.resolve_context(cli.context.as_deref()) {
        Some(ctx) => Ok(ctx.clone()),
        None => match cli.context.as_deref() {
            Some(name) => anyhow::bail!("context '{}' not found", name),
            None => Ok(Context::default()),
        },
    }
}

/// The store a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub backend: Backend,
    pub path: PathBuf,
}

/// Resolves backend and database file. Flags override the context; a
/// `--backend` that differs from the context's backend falls back to that
/// backend's default file unless `--db` is given.
pub fn resolve_target(cli: &Cli) -> anyhow::Result<Target> {
    let ctx = get_context(cli)?;
    let ctx_backend: Backend = ctx.backend().parse()?;
    let backend: Backend = match cli.backend.as_deref() {
        Some(name) => name.parse()?,
        None => ctx_backend,
    };

    let path = match cli.db.as_deref() {
        Some(path) => PathBuf::from(path),
        None if backend == ctx_backend && !ctx.path.is_empty() => PathBuf::from(&ctx.path),
        None => Paths::new(APP_NAME)?.db_path(backend.as_str()),
    };

    Ok(Target { backend, path })
}

/// Opens the library selected by flags and context.
pub fn open_library(cli: &Cli) -> anyhow::Result<Box<dyn Library>> {
    let target = resolve_target(cli)?;
    print_verbose(
        cli,
        &format!("Using {} backend at {}", target.backend, target.path.display()),
    );

    if let Some(parent) = target.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = RedbStore::open(&target.path)?;
    Ok(shelf_library::open(target.backend, Box::new(store)))
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(cli: &Cli, result: &T) -> anyhow::Result<()> {
    Output::new(OutputFormat::from_flag(cli.json), cli.output.clone()).write(result)
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m✗\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    fn parse(config: &str, extra: &[&str]) -> Cli {
        let mut argv = vec!["shelf", "--config", config];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["echo", "hi"]);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_resolve_target_from_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        let config = config.to_str().unwrap();

        let mut cfg = load_config(APP_NAME, Some(config)).unwrap();
        let ctx = Context {
            backend: "graph".into(),
            path: "/srv/g.redb".into(),
            ..Default::default()
        };
        cfg.add_context("archive", ctx).unwrap();
        cfg.use_context("archive").unwrap();

        let target = resolve_target(&parse(config, &[])).unwrap();
        assert_eq!(target.backend, Backend::Graph);
        assert_eq!(target.path, PathBuf::from("/srv/g.redb"));

        let target = resolve_target(&parse(config, &["--db", "/tmp/x.redb"])).unwrap();
        assert_eq!(target.backend, Backend::Graph);
        assert_eq!(target.path, PathBuf::from("/tmp/x.redb"));

        let target =
            resolve_target(&parse(config, &["--backend", "doc", "--db", "/tmp/d.redb"])).unwrap();
        assert_eq!(target.backend, Backend::Doc);
        assert_eq!(target.path, PathBuf::from("/tmp/d.redb"));

        assert!(resolve_target(&parse(config, &["-c", "missing"])).is_err());
    }

    #[test]
    fn test_resolve_target_without_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        let config = config.to_str().unwrap();

        let target = resolve_target(&parse(config, &["--db", "/tmp/k.redb"])).unwrap();
        assert_eq!(target.backend, Backend::Kv);
        assert!(resolve_target(&parse(config, &["--backend", "sql"])).is_err());
    }
}
