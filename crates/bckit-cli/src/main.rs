use bckit_core::{CommandContext, CommandGroup, CommandInfo, ExecutionOutcome, GlobalOptions};
use clap::Parser;
use color_eyre::Result;
use serde_json::json;

mod cli;
mod dispatch;
mod output;
mod style;

use cli::{BckitCli, CommandGroupCli};
use dispatch::dispatch_command;
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = BckitCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        jobs: cli.jobs,
        cache_dir: cli.cache_dir.clone(),
    };
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };

    let (info, outcome) = match CommandContext::new(&global) {
        Ok(ctx) => dispatch_command(&ctx, &cli.command)?,
        Err(err) => (
            command_info(&cli.command),
            ExecutionOutcome::user_error(
                format!("{err:#}"),
                json!({
                    "reason": "invalid_configuration",
                    "hint": "check the BCKIT_* environment variables",
                }),
            ),
        ),
    };
    let code = emit_output(&opts, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn command_info(command: &CommandGroupCli) -> CommandInfo {
    match command {
        CommandGroupCli::Catalog(_) => CommandInfo::new(CommandGroup::Catalog, "catalog"),
        CommandGroupCli::Prune(_) => CommandInfo::new(CommandGroup::Prune, "prune"),
        CommandGroupCli::Publish(_) => CommandInfo::new(CommandGroup::Publish, "publish"),
        CommandGroupCli::Migrate(_) => CommandInfo::new(CommandGroup::Migrate, "migrate"),
        CommandGroupCli::Index(_) => CommandInfo::new(CommandGroup::Index, "check"),
        CommandGroupCli::KeepSet(_) => CommandInfo::new(CommandGroup::KeepSet, "keep-set"),
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("bckit_core={level},bckit_store={level},bckit_domain={level},bckit={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
