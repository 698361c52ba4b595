use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

use worktrail::groups::ConsolidationMethod;
use worktrail::{ArtifactType, Priority, Schedule};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "wt")]
#[command(bin_name = "wt")]
#[command(version)]
#[command(about = "Local-first tracking of work items and the artifacts behind them")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'C',
        long = "root",
        env = "WORKTRAIL_ROOT",
        value_delimiter = ',',
        default_value = ".",
        help = "Storage root. Repeat to view several roots; new entities go to the first."
    )]
    pub roots: Vec<PathBuf>,

    #[arg(long, global = true, help = "Print machine-readable JSON.")]
    pub json: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v info, -vv debug). WORKTRAIL_LOG overrides."
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(subcommand, about = "Create, list and move work items.")]
    Work(WorkCommands),
    #[command(subcommand, about = "Create and list artifacts.")]
    Artifact(ArtifactCommands),
    #[command(about = "Associate an artifact with a work item.")]
    Link(LinkArgs),
    #[command(about = "Remove an association between a work item and an artifact.")]
    Unlink(LinkArgs),
    #[command(about = "Mark two artifacts as related (or unrelated with --remove).")]
    Relate(RelateArgs),
    #[command(about = "Case-insensitive search over work and artifacts.")]
    Search(SearchArgs),
    #[command(about = "List artifacts with no work, relation or group.")]
    Orphans,
    #[command(about = "Show the association graph or its summary.")]
    Graph(GraphArgs),
    #[command(about = "Rank entities sharing tags with the given ones.")]
    Similar(SimilarArgs),
    #[command(about = "Analyze stale, orphaned and unsupported entities.")]
    Decay,
    #[command(about = "Execute every cleanup action that is safe without review.")]
    Cleanup,
    #[command(subcommand, about = "Manage artifact groups.")]
    Group(GroupCommands),
    #[command(subcommand, about = "Record and read work progress updates.")]
    Update(UpdateCommands),
    #[command(subcommand, about = "Inspect or create worktrail.toml.")]
    Config(ConfigCommands),
    #[command(about = "Report ids stored in more than one file.")]
    Duplicates(DuplicatesArgs),
}

#[derive(Debug, Subcommand)]
pub enum WorkCommands {
    #[command(about = "Create a work item.")]
    New(NewWorkArgs),
    #[command(about = "List work items by priority.")]
    Ls(ListWorkArgs),
    #[command(about = "Show one work item.")]
    Show(IdArg),
    #[command(about = "Start a work item and move it to now.")]
    Start(IdArg),
    #[command(about = "Complete a work item and move it to closed.")]
    Done(IdArg),
    #[command(about = "Move a work item to another schedule.")]
    Move(MoveWorkArgs),
}

#[derive(Debug, Args)]
pub struct NewWorkArgs {
    #[arg(help = "Work title.")]
    pub title: String,

    #[arg(short = 'd', long = "desc", default_value = "", help = "Description text.")]
    pub desc: String,

    #[arg(short = 's', long, default_value = "next", help = "now, next, later or closed.")]
    pub schedule: Schedule,

    #[arg(short = 'p', long, default_value = "medium", help = "critical, high, medium or low.")]
    pub priority: Priority,

    #[arg(short = 't', long = "tag", help = "Technical tag (repeatable).")]
    pub tags: Vec<String>,

    #[arg(long, default_value = "", help = "Document body.")]
    pub body: String,
}

#[derive(Debug, Args)]
pub struct ListWorkArgs {
    #[arg(short = 's', long, help = "Only this schedule.")]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Args)]
pub struct MoveWorkArgs {
    #[arg(help = "Work id.")]
    pub id: String,

    #[arg(help = "Target schedule.")]
    pub schedule: Schedule,
}

#[derive(Debug, Args)]
pub struct IdArg {
    #[arg(help = "Entity id.")]
    pub id: String,
}

#[derive(Debug, Subcommand)]
pub enum ArtifactCommands {
    #[command(about = "Create an artifact.")]
    New(NewArtifactArgs),
    #[command(about = "List artifacts, newest first.")]
    Ls(ListArtifactArgs),
    #[command(about = "Show one artifact.")]
    Show(IdArg),
}

#[derive(Debug, Args)]
pub struct NewArtifactArgs {
    #[arg(help = "plan, proposal, analysis, update or decision.")]
    pub artifact_type: ArtifactType,

    #[arg(help = "One-line summary.")]
    pub summary: String,

    #[arg(long, default_value = "", help = "Document body.")]
    pub content: String,

    #[arg(short = 't', long = "tag", help = "Technical tag (repeatable).")]
    pub tags: Vec<String>,

    #[arg(short = 'w', long = "work", help = "Associate with this work item.")]
    pub work_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArtifactArgs {
    #[arg(long = "type", help = "Only this artifact type.")]
    pub artifact_type: Option<ArtifactType>,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    #[arg(help = "Work id.")]
    pub work_id: String,

    #[arg(help = "Artifact id.")]
    pub artifact_id: String,
}

#[derive(Debug, Args)]
pub struct RelateArgs {
    pub left: String,
    pub right: String,

    #[arg(long, help = "Remove the relation instead.")]
    pub remove: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(help = "Substring to look for.")]
    pub query: String,
}

#[derive(Debug, Args)]
pub struct GraphArgs {
    #[arg(long, help = "Only print totals and the most connected entities.")]
    pub summary: bool,
}

#[derive(Debug, Args)]
pub struct SimilarArgs {
    #[arg(required = true, help = "Tags to compare against.")]
    pub tags: Vec<String>,

    #[arg(long, help = "Id to leave out of the ranking.")]
    pub exclude: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum GroupCommands {
    #[command(about = "Create a group from artifacts.")]
    New(NewGroupArgs),
    #[command(about = "List groups.")]
    Ls,
    #[command(about = "Show one group.")]
    Show(IdArg),
    #[command(about = "Add an artifact to a group.")]
    Add(GroupMemberArgs),
    #[command(about = "Remove an artifact from a group.")]
    Remove(GroupMemberArgs),
    #[command(about = "Delete a group; members stay.")]
    Delete(IdArg),
    #[command(about = "Turn a ready group into a work item.")]
    Consolidate(ConsolidateArgs),
    #[command(about = "Report group readiness and recommendations.")]
    Health,
    #[command(about = "Propose groups from shared tags of ungrouped artifacts.")]
    Suggest(SuggestArgs),
}

#[derive(Debug, Args)]
pub struct NewGroupArgs {
    #[arg(help = "Group name.")]
    pub name: String,

    #[arg(required = true, help = "Member artifact ids.")]
    pub artifact_ids: Vec<String>,

    #[arg(short = 'd', long = "desc", default_value = "")]
    pub desc: String,

    #[arg(long, default_value = "")]
    pub theme: String,
}

#[derive(Debug, Args)]
pub struct GroupMemberArgs {
    pub group_id: String,
    pub artifact_id: String,
}

#[derive(Debug, Args)]
pub struct ConsolidateArgs {
    pub group_id: String,

    #[arg(long, default_value = "manual", help = "manual or automatic.")]
    pub method: ConsolidationMethod,
}

#[derive(Debug, Args)]
pub struct SuggestArgs {
    #[arg(long, default_value_t = 2, help = "Smallest cluster worth suggesting.")]
    pub min_size: usize,
}

#[derive(Debug, Subcommand)]
pub enum UpdateCommands {
    #[command(about = "Record a progress update for a work item.")]
    Add(AddUpdateArgs),
    #[command(about = "List updates for a work item, newest first.")]
    Ls(IdArg),
}

#[derive(Debug, Args)]
pub struct AddUpdateArgs {
    #[arg(help = "Work id.")]
    pub work_id: String,

    #[arg(help = "Update title.")]
    pub title: String,

    #[arg(long, default_value = "")]
    pub summary: String,

    #[arg(long, help = "Author; omitted means an automatic update.")]
    pub author: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub progress: Option<u8>,

    #[arg(long = "task-added")]
    pub tasks_added: Vec<String>,

    #[arg(long = "task-done")]
    pub tasks_completed: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Write the default worktrail.toml into the first root.")]
    Init(ConfigInitArgs),
    #[command(about = "Print the effective configuration of the first root.")]
    Show,
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    #[arg(long, help = "Overwrite an existing file.")]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    #[arg(long, help = "Delete the stale copies.")]
    pub remove: bool,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, WorkCommands};
    use clap::Parser;
    use worktrail::{Priority, Schedule};

    #[test]
    fn parses_repeated_roots_and_work_flags() {
        let cli = Cli::try_parse_from([
            "wt", "-C", "/a", "--root", "/b", "work", "new", "Fix login", "-s", "now", "-p",
            "high", "-t", "auth",
        ])
        .expect("arguments should parse");
        assert_eq!(cli.roots.len(), 2);
        match cli.command {
            Commands::Work(WorkCommands::New(args)) => {
                assert_eq!(args.title, "Fix login");
                assert_eq!(args.schedule, Schedule::Now);
                assert_eq!(args.priority, Priority::High);
                assert_eq!(args.tags, vec!["auth"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_schedule() {
        let result = Cli::try_parse_from(["wt", "work", "ls", "--schedule", "someday"]);
        assert!(result.is_err());
    }

    #[test]
    fn json_and_verbosity_are_global() {
        let cli = Cli::try_parse_from(["wt", "decay", "--json", "-vv"])
            .expect("arguments should parse");
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
