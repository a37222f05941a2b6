//! Content indexer binary.

use anyhow::Result;
use clap::Parser;

use indexer_daemon::{
    clear_index, count_documents, delete_paths, index_paths, init_logging, load_settings,
    resolve_root, Cli, Commands, RunSummary,
};

fn report(summary: RunSummary) -> Result<()> {
    println!("{}", summary);
    if summary.failed > 0 || summary.unfinished > 0 {
        anyhow::bail!(
            "{} of {} jobs did not succeed",
            summary.failed + summary.unfinished,
            summary.submitted
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref(), cli.workers)?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Index {
            index,
            priority,
            requester,
            params,
            paths,
        } => {
            let root = resolve_root(cli.root.as_deref())?;
            let summary =
                index_paths(&settings, &root, &index, priority, &requester, params, &paths).await?;
            report(summary)
        }
        Commands::Delete { index, paths } => {
            let root = resolve_root(cli.root.as_deref())?;
            report(delete_paths(&settings, &root, &index, &paths).await?)
        }
        Commands::Clear { index } => {
            let root = resolve_root(cli.root.as_deref())?;
            report(clear_index(&settings, &root, &index).await?)
        }
        Commands::Count { index } => {
            println!("{}", count_documents(&settings, &index)?);
            Ok(())
        }
    }
}
