use std::path::PathBuf;

use bckit_core::prune::PruneMethod;
use bckit_domain::Layout;
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand, ValueEnum};
use time::macros::format_description;
use time::Date;

pub const BCKIT_BEFORE_HELP: &str = concat!(
    "bckit ",
    env!("CARGO_PKG_VERSION"),
    " – build-cache mirror maintenance\n\n",
    "\x1b[1;36mInspect\x1b[0m\n",
    "  catalog          Count complete and incomplete specs per stack.\n",
    "  index check      Compare the mirror index with the mirror contents.\n\n",
    "\x1b[1;36mMaintain\x1b[0m\n",
    "  prune            Select (and with -D delete) stale or orphaned specs.\n",
    "  publish          Copy verified stack specs into the root mirror (--upload to copy).\n",
    "  migrate          Convert a v2 mirror to the v3 layout (--upload to write).\n",
    "  keep-set         Collect hashes from spack.lock files into a keep list.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "bckit",
    author,
    version,
    disable_help_subcommand = true,
    before_help = BCKIT_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct BckitCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        short = 'j',
        long,
        visible_alias = "nprocs",
        help = "Worker threads for listing, downloads, copies, and deletes",
        global = true
    )]
    pub jobs: Option<usize>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Where listings and manifests are cached (default: BCKIT_CACHE_DIR or the user cache dir)",
        global = true
    )]
    pub cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Summarise the specs of a mirror and its stacks")]
    Catalog(CatalogArgs),
    #[command(about = "Find prunable specs and optionally delete them")]
    Prune(PruneArgs),
    #[command(about = "Publish specs that are complete in a stack but missing from the root")]
    Publish(PublishArgs),
    #[command(about = "Migrate a v2 mirror to the v3 content-addressed layout")]
    Migrate(MigrateArgs),
    #[command(subcommand, about = "Inspect the mirror index")]
    Index(IndexCommand),
    #[command(about = "Write a keep list from the spack.lock files under a directory")]
    KeepSet(KeepSetArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LayoutArg {
    #[default]
    V2,
    V3,
}

impl From<LayoutArg> for Layout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::V2 => Layout::V2,
            LayoutArg::V3 => Layout::V3,
        }
    }
}

#[derive(Args, Debug)]
pub struct MirrorArgs {
    #[arg(value_name = "MIRROR", help = "s3://bucket/prefix, file:///path, or a directory")]
    pub mirror: String,
    #[arg(long, value_enum, default_value_t = LayoutArg::V2, help = "Mirror layout")]
    pub layout: LayoutArg,
    #[arg(short, long, help = "Ignore the cached listing and list the mirror again")]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CatalogArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,
    #[arg(long, value_name = "STACK", help = "Leave a stack out of the catalog")]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("method")
        .required(true)
        .args(["direct", "orphaned", "check_index"])
))]
#[command(group(ArgGroup::new("window").args(["since_days", "start_date"])))]
#[allow(clippy::struct_excessive_bools)]
pub struct PruneArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,
    #[arg(long, help = "Prune specs older than the cutoff that are not kept")]
    pub direct: bool,
    #[arg(long, help = "Prune archives missing from the index and index entries missing archives")]
    pub orphaned: bool,
    #[arg(long, help = "Prune every indexed spec that is not kept")]
    pub check_index: bool,
    #[arg(long, value_name = "N", help = "Cutoff age in days (default 14)")]
    pub since_days: Option<u32>,
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date, help = "Cutoff date (midnight UTC)")]
    pub start_date: Option<Date>,
    #[arg(long, value_name = "FILE", help = "Newline-delimited hashes that must never be pruned")]
    pub keep_hashes: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "Prune exactly these hashes (a previous prunable-hashes report)")]
    pub prune_hashes: Option<PathBuf>,
    #[arg(short = 'o', long = "output-dir", value_name = "DIR", default_value = ".", help = "Where run reports are written")]
    pub output_dir: PathBuf,
    #[arg(long, default_value = "", help = "Suffix appended to report file names")]
    pub suffix: String,
    #[arg(short = 'D', long, help = "Delete the prunable objects")]
    pub delete: bool,
}

impl PruneArgs {
    pub fn method(&self) -> PruneMethod {
        if self.orphaned {
            PruneMethod::Orphan
        } else if self.check_index {
            PruneMethod::Index
        } else {
            PruneMethod::Direct
        }
    }
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,
    #[arg(long, value_name = "STACK", help = "Never publish from this stack")]
    pub exclude: Vec<String>,
    #[arg(long, value_name = "URL", help = "Trusted public key (default: BCKIT_PUBLIC_KEY_URL)")]
    pub key_url: Option<String>,
    #[arg(long, value_name = "DIR", help = "Scratch directory for keys")]
    pub workdir: Option<PathBuf>,
    #[arg(long, help = "Copy specs (dry run otherwise)")]
    pub upload: bool,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[arg(value_name = "MIRROR")]
    pub mirror: String,
    #[arg(long, help = "Write v3 blobs and manifests (dry run otherwise)")]
    pub upload: bool,
    #[arg(short, long, help = "Re-list the mirror and migrate specs that already have manifests")]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    #[command(about = "Report specs the index and the mirror disagree on")]
    Check(MirrorArgs),
}

#[derive(Args, Debug)]
pub struct KeepSetArgs {
    #[arg(value_name = "DIR", help = "Directory searched for spack.lock files")]
    pub root: PathBuf,
    #[arg(short, long, value_name = "FILE", help = "Keep list to write")]
    pub output: PathBuf,
}

fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        BckitCli::command().debug_assert();
    }

    #[test]
    fn prune_requires_exactly_one_method() {
        assert!(BckitCli::try_parse_from(["bckit", "prune", "m"]).is_err());
        assert!(BckitCli::try_parse_from(["bckit", "prune", "m", "--direct", "--orphaned"]).is_err());
        let cli = BckitCli::try_parse_from(["bckit", "prune", "m", "--check-index", "-D"]).unwrap();
        let CommandGroupCli::Prune(args) = cli.command else {
            panic!("expected prune");
        };
        assert_eq!(args.method(), PruneMethod::Index);
        assert!(args.delete);
    }

    #[test]
    fn cutoff_options_conflict() {
        assert!(BckitCli::try_parse_from([
            "bckit",
            "prune",
            "m",
            "--direct",
            "--since-days",
            "3",
            "--start-date",
            "2024-01-01"
        ])
        .is_err());
        assert!(parse_date("2024-13-01").is_err());
    }

    #[test]
    fn nprocs_is_an_alias_for_jobs() {
        let cli = BckitCli::try_parse_from(["bckit", "--nprocs", "6", "catalog", "m"]).unwrap();
        assert_eq!(cli.jobs, Some(6));
        let cli = BckitCli::try_parse_from(["bckit", "catalog", "m", "-j", "2"]).unwrap();
        assert_eq!(cli.jobs, Some(2));
    }
}
