//! Command dispatch

use std::path::Path;

use colored::Colorize;

use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::Result;
use crate::corpus::TestCorpus;
use crate::testing::SuiteRunner;

/// Exit status when `--strict` is set and a unit failed
pub const EXIT_TESTS_FAILED: i32 = 2;

/// Run a command, returning the process exit status
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<i32> {
    let mut config = Config::load(config_path)?;

    match command {
        Commands::Run(args) => run_suite(&args, &mut config).await,
        Commands::List { corpus } => {
            let root = corpus.unwrap_or_else(|| config.corpus.root.clone());
            list_corpus(&root)?;
            Ok(0)
        }
    }
}

async fn run_suite(args: &RunArgs, config: &mut Config) -> Result<i32> {
    args.apply(config);
    tracing::debug!("Effective configuration: {:?}", config);

    let corpus = TestCorpus::discover(&config.corpus.root)?;
    let runner = SuiteRunner::new(config.clone())?;
    let report = runner.run(&corpus).await;

    if args.strict && !report.summary.all_passed() {
        return Ok(EXIT_TESTS_FAILED);
    }
    Ok(0)
}

fn list_corpus(root: &Path) -> Result<()> {
    let corpus = TestCorpus::discover(root)?;

    println!("Corpus: {}", corpus.root().display());
    if corpus.is_empty() {
        println!("No test units found");
        return Ok(());
    }

    for unit in corpus.units() {
        let status = if unit.is_runnable() {
            "runnable".green()
        } else {
            "incomplete".yellow()
        };
        println!("  {} [{}]", unit.name.bold(), status);
        print_artifact("System.map", unit.symbol_map.as_deref());
        print_artifact("vmlinuz", unit.kernel_image.as_deref());
    }

    println!(
        "\n{} units, {} runnable",
        corpus.len(),
        corpus.runnable_count()
    );
    Ok(())
}

fn print_artifact(label: &str, path: Option<&Path>) {
    match path {
        Some(path) => println!("    {:<10} {}", label, path.display()),
        None => println!("    {:<10} {}", label, "(missing)".dimmed()),
    }
}
