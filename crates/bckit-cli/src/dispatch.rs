use color_eyre::Result;
use bckit_core::commands::{
    catalog_summary, index_check, keep_set, migrate_layout, prune_mirror, publish_stacks,
    CatalogRequest, IndexCheckRequest, KeepSetRequest, MigrateRequest, PruneRequest,
    PublishRequest,
};
use bckit_core::{CommandContext, CommandGroup, CommandInfo, ExecutionOutcome};
use serde_json::json;

use crate::cli::{CommandGroupCli, IndexCommand};

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Catalog(args) => {
            let info = CommandInfo::new(CommandGroup::Catalog, "catalog");
            let request = CatalogRequest {
                mirror: args.mirror.mirror.clone(),
                layout: args.mirror.layout.into(),
                exclude: args.exclude.clone(),
                force: args.mirror.force,
            };
            core_call(info, || catalog_summary(ctx, request))
        }
        CommandGroupCli::Prune(args) => {
            let info = CommandInfo::new(CommandGroup::Prune, "prune");
            let request = PruneRequest {
                mirror: args.mirror.mirror.clone(),
                method: args.method(),
                layout: args.mirror.layout.into(),
                since_days: args.since_days,
                start_date: args.start_date,
                keep_hashes: args.keep_hashes.clone(),
                prune_hashes: args.prune_hashes.clone(),
                output_dir: args.output_dir.clone(),
                suffix: args.suffix.clone(),
                delete: args.delete,
                force: args.mirror.force,
            };
            core_call(info, || prune_mirror(ctx, request))
        }
        CommandGroupCli::Publish(args) => {
            let info = CommandInfo::new(CommandGroup::Publish, "publish");
            let request = PublishRequest {
                mirror: args.mirror.mirror.clone(),
                layout: args.mirror.layout.into(),
                exclude: args.exclude.clone(),
                key_url: args.key_url.clone(),
                workdir: args.workdir.clone(),
                upload: args.upload,
                force: args.mirror.force,
            };
            core_call(info, || publish_stacks(ctx, request))
        }
        CommandGroupCli::Migrate(args) => {
            let info = CommandInfo::new(CommandGroup::Migrate, "migrate");
            let request = MigrateRequest {
                mirror: args.mirror.clone(),
                upload: args.upload,
                force: args.force,
            };
            core_call(info, || migrate_layout(ctx, request))
        }
        CommandGroupCli::Index(IndexCommand::Check(args)) => {
            let info = CommandInfo::new(CommandGroup::Index, "check");
            let request = IndexCheckRequest {
                mirror: args.mirror.clone(),
                layout: args.layout.into(),
                force: args.force,
            };
            core_call(info, || index_check(ctx, request))
        }
        CommandGroupCli::KeepSet(args) => {
            let info = CommandInfo::new(CommandGroup::KeepSet, "keep-set");
            let request = KeepSetRequest {
                root: args.root.clone(),
                output: args.output.clone(),
            };
            core_call(info, || keep_set(ctx, request))
        }
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => {
            let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
            Ok((
                info,
                ExecutionOutcome::failure(
                    err.to_string(),
                    json!({
                        "reason": "internal_error",
                        "error": format!("{err:#}"),
                        "issues": issues,
                    }),
                ),
            ))
        }
    }
}
