mod cli;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{
    ArtifactCommands, Cli, Commands, ConfigCommands, GroupCommands, UpdateCommands, WorkCommands,
};
use worktrail::app::{ArtifactDraft, UpdateDraft, WorkDraft};
use worktrail::config::EngineConfig;
use worktrail::domain::metadata::{format_rfc3339, now_utc};
use worktrail::entity_id::display_id;
use worktrail::lifecycle::DecayAnalysis;
use worktrail::roots::RootSet;
use worktrail::{AppError, Artifact, Group, Work};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env("WORKTRAIL_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{}", rendered);
    Ok(())
}

fn run(cli: Cli) -> Result<(), AppError> {
    let json = cli.json;

    if let Commands::Config(ConfigCommands::Init(args)) = &cli.command {
        let root = cli.roots.first().cloned().unwrap_or_else(|| ".".into());
        let path = EngineConfig::path_for_root(&root);
        if path.exists() && !args.force {
            return Err(AppError::InvalidArgument(format!(
                "{} already exists; pass --force to overwrite",
                path.display()
            )));
        }
        std::fs::create_dir_all(&root)?;
        std::fs::write(&path, EngineConfig::default().to_toml_string()?)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let roots = RootSet::open(cli.roots)?;
    let primary = roots.primary();

    match cli.command {
        Commands::Work(command) => match command {
            WorkCommands::New(args) => {
                let work = primary.create_work(WorkDraft {
                    title: args.title,
                    description: args.desc,
                    schedule: args.schedule,
                    priority: args.priority,
                    tags: args.tags,
                    content: args.body,
                })?;
                emit_work(&work, json)?;
            }
            WorkCommands::Ls(args) => {
                let listed = roots.list_work(args.schedule)?;
                if json {
                    print_json(&listed)?;
                } else if listed.is_empty() {
                    println!("no work");
                } else {
                    for item in &listed {
                        println!("{}", work_line(&item.work));
                    }
                }
            }
            WorkCommands::Show(args) => {
                let (_, work) = roots.locate_work(&args.id)?;
                if json {
                    print_json(&work)?;
                } else {
                    print_work_detail(&work);
                }
            }
            WorkCommands::Start(args) => {
                let (app, _) = roots.locate_work(&args.id)?;
                emit_work(&app.start_work(&args.id)?, json)?;
            }
            WorkCommands::Done(args) => {
                let (app, _) = roots.locate_work(&args.id)?;
                emit_work(&app.complete_work(&args.id)?, json)?;
            }
            WorkCommands::Move(args) => {
                let (app, _) = roots.locate_work(&args.id)?;
                emit_work(&app.update_schedule(&args.id, args.schedule)?, json)?;
            }
        },
        Commands::Artifact(command) => match command {
            ArtifactCommands::New(args) => {
                let app = match args.work_id.as_deref() {
                    Some(work_id) => roots.locate_work(work_id)?.0,
                    None => primary,
                };
                let artifact = app.create_artifact(ArtifactDraft {
                    artifact_type: args.artifact_type,
                    summary: args.summary,
                    content: args.content,
                    tags: args.tags,
                    work_id: args.work_id,
                })?;
                emit_artifact(&artifact, json)?;
            }
            ArtifactCommands::Ls(args) => {
                let mut listed = Vec::new();
                for app in roots.apps() {
                    listed.extend(app.list_artifacts(args.artifact_type)?);
                }
                if json {
                    print_json(&listed)?;
                } else if listed.is_empty() {
                    println!("no artifacts");
                } else {
                    for artifact in &listed {
                        println!("{}", artifact_line(artifact));
                    }
                }
            }
            ArtifactCommands::Show(args) => {
                let (_, artifact) = roots.locate_artifact(&args.id)?;
                if json {
                    print_json(&artifact)?;
                } else {
                    println!("{}", artifact_line(&artifact));
                    if !artifact.content.trim().is_empty() {
                        println!();
                        println!("{}", artifact.content.trim_end());
                    }
                }
            }
        },
        Commands::Link(args) => {
            let (app, _) = roots.locate_work(&args.work_id)?;
            let association = app.associate(&args.work_id, &args.artifact_id)?;
            print_change(json, association.changed, "linked", &args.work_id, &args.artifact_id)?;
        }
        Commands::Unlink(args) => {
            let (app, _) = roots.locate_work(&args.work_id)?;
            let association = app.dissociate(&args.work_id, &args.artifact_id)?;
            print_change(json, association.changed, "unlinked", &args.work_id, &args.artifact_id)?;
        }
        Commands::Relate(args) => {
            let (app, _) = roots.locate_artifact(&args.left)?;
            let changed = if args.remove {
                app.unlink_related(&args.left, &args.right)?
            } else {
                app.link_related(&args.left, &args.right)?
            };
            let verb = if args.remove { "unrelated" } else { "related" };
            print_change(json, changed, verb, &args.left, &args.right)?;
        }
        Commands::Search(args) => {
            let hits = roots.search(&args.query)?;
            if json {
                print_json(&hits)?;
            } else if hits.is_empty() {
                println!("no matches for '{}'", args.query);
            } else {
                for hit in &hits {
                    if roots.len() > 1 {
                        println!("[{}]", hit.root.display());
                    }
                    for work in &hit.results.work {
                        println!("{}", work_line(work));
                    }
                    for artifact in &hit.results.artifacts {
                        println!("{}", artifact_line(artifact));
                    }
                }
            }
        }
        Commands::Orphans => {
            let mut orphans = Vec::new();
            for app in roots.apps() {
                orphans.extend(app.orphaned_artifacts()?);
            }
            if json {
                print_json(&orphans)?;
            } else if orphans.is_empty() {
                println!("no orphaned artifacts");
            } else {
                for artifact in &orphans {
                    println!("{}", artifact_line(artifact));
                }
            }
        }
        Commands::Graph(args) => {
            if args.summary {
                let summary = primary.association_summary()?;
                if json {
                    print_json(&summary)?;
                } else {
                    println!(
                        "work {}  artifacts {}  associations {}  orphaned {}  unsupported work {}",
                        summary.total_work,
                        summary.total_artifacts,
                        summary.total_associations,
                        summary.orphaned_artifacts,
                        summary.work_without_artifacts
                    );
                }
            } else {
                let graph = primary.graph()?;
                if json {
                    print_json(&graph)?;
                } else {
                    for (work_id, artifacts) in &graph.work_to_artifacts {
                        println!("{} -> {}", display_id(work_id), artifacts.join(", "));
                    }
                }
            }
        }
        Commands::Similar(args) => {
            let similar = primary.similar(&args.tags, args.exclude.as_deref())?;
            if json {
                print_json(&similar)?;
            } else {
                for entity in &similar {
                    println!(
                        "{:>2}  {:<8} {}  {}  [{}]",
                        entity.overlap,
                        entity.kind,
                        display_id(&entity.id),
                        entity.title,
                        entity.shared_tags.join(", ")
                    );
                }
            }
        }
        Commands::Decay => {
            let now = now_utc();
            for app in roots.apps() {
                let analysis = app.analyze_decay(now)?;
                if json {
                    print_json(&analysis)?;
                } else {
                    if roots.len() > 1 {
                        println!("[{}]", app.root().display());
                    }
                    print_decay(&analysis);
                }
            }
        }
        Commands::Cleanup => {
            let now = now_utc();
            for app in roots.apps() {
                let report = app.auto_cleanup(now)?;
                if json {
                    print_json(&report)?;
                } else {
                    println!(
                        "{}: {} attempted, {} succeeded, {} failed",
                        app.root().display(),
                        report.attempted,
                        report.succeeded,
                        report.failed
                    );
                    for result in report.results.iter().filter(|r| r.error.is_some()) {
                        println!(
                            "  {} {}: {}",
                            result.action.action_type,
                            display_id(&result.action.item_id),
                            result.error.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
        Commands::Group(command) => run_group(&roots, command, json)?,
        Commands::Update(command) => match command {
            UpdateCommands::Add(args) => {
                let (app, _) = roots.locate_work(&args.work_id)?;
                let update = app.record_update(
                    &args.work_id,
                    UpdateDraft {
                        author: args.author,
                        title: args.title,
                        summary: args.summary,
                        tasks_added: args.tasks_added,
                        tasks_completed: args.tasks_completed,
                        progress: args.progress,
                    },
                )?;
                if json {
                    print_json(&update)?;
                } else {
                    println!(
                        "recorded {} ({}%)",
                        display_id(&update.id),
                        update.progress_after
                    );
                }
            }
            UpdateCommands::Ls(args) => {
                let (app, _) = roots.locate_work(&args.id)?;
                let updates = app.updates(&args.id)?;
                if json {
                    print_json(&updates)?;
                } else {
                    for update in &updates {
                        println!(
                            "{}  {:<9} {:>3}%  {}  ({})",
                            format_rfc3339(update.timestamp),
                            update.kind,
                            update.progress_after,
                            update.title,
                            update.author
                        );
                    }
                }
            }
        },
        Commands::Config(ConfigCommands::Show) => {
            let config = primary.config();
            if json {
                print_json(config)?;
            } else {
                print!("{}", config.to_toml_string()?);
            }
        }
        // Written before any root is opened.
        Commands::Config(ConfigCommands::Init(_)) => {}
        Commands::Duplicates(args) => {
            for app in roots.apps() {
                let duplicates = app.find_duplicates()?;
                if json {
                    print_json(&duplicates)?;
                } else {
                    for set in &duplicates {
                        println!(
                            "{} {}: keeping {}, stale {}",
                            set.kind,
                            set.id,
                            set.kept.display(),
                            set.stale
                                .iter()
                                .map(|path| path.display().to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                    }
                }
                if args.remove {
                    let removed = app.remove_duplicates()?;
                    if !json {
                        println!("removed {} stale copies in {}", removed, app.root().display());
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_group(roots: &RootSet, command: GroupCommands, json: bool) -> Result<(), AppError> {
    match command {
        GroupCommands::New(args) => {
            let group = roots.primary().create_group(
                &args.name,
                &args.desc,
                &args.theme,
                &args.artifact_ids,
            )?;
            emit_group(&group, json)?;
        }
        GroupCommands::Ls => {
            let mut groups = Vec::new();
            for app in roots.apps() {
                groups.extend(app.list_groups()?);
            }
            if json {
                print_json(&groups)?;
            } else if groups.is_empty() {
                println!("no groups");
            } else {
                for group in &groups {
                    println!("{}", group_line(group));
                }
            }
        }
        GroupCommands::Show(args) => {
            let group = roots.locate_group(&args.id)?.find_group(&args.id)?;
            if json {
                print_json(&group)?;
            } else {
                println!("{}", group_line(&group));
                for id in group.artifact_ids() {
                    println!("  {}", id);
                }
            }
        }
        GroupCommands::Add(args) => {
            let app = roots.locate_group(&args.group_id)?;
            emit_group(&app.add_group_artifact(&args.group_id, &args.artifact_id)?, json)?;
        }
        GroupCommands::Remove(args) => {
            let app = roots.locate_group(&args.group_id)?;
            emit_group(
                &app.remove_group_artifact(&args.group_id, &args.artifact_id)?,
                json,
            )?;
        }
        GroupCommands::Delete(args) => {
            let app = roots.locate_group(&args.id)?;
            let group = app.delete_group(&args.id)?;
            if json {
                print_json(&group)?;
            } else {
                println!("deleted {}", display_id(&group.id));
            }
        }
        GroupCommands::Consolidate(args) => {
            let app = roots.locate_group(&args.group_id)?;
            let consolidation = app.consolidate_group(&args.group_id, args.method)?;
            if json {
                print_json(&consolidation.work)?;
            } else {
                println!("{}", work_line(&consolidation.work));
                for id in &consolidation.unlinked_artifacts {
                    println!("  warning: {} was not linked back", id);
                }
            }
        }
        GroupCommands::Health => {
            for app in roots.apps() {
                let report = app.group_health()?;
                if json {
                    print_json(&report)?;
                } else {
                    println!(
                        "{} groups ({} active), readiness {:.2}, cohesion {:.2}",
                        report.total_groups,
                        report.active,
                        report.average_readiness,
                        report.average_cohesion
                    );
                    for line in &report.recommendations {
                        println!("  - {}", line);
                    }
                }
            }
        }
        GroupCommands::Suggest(args) => {
            let suggestions = roots.primary().suggest_groups(args.min_size)?;
            if json {
                print_json(&suggestions)?;
            } else {
                for suggestion in &suggestions {
                    println!(
                        "#{}  {} artifacts  readiness {:.2}",
                        suggestion.tag,
                        suggestion.artifact_ids.len(),
                        suggestion.estimated_readiness
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_change(
    json: bool,
    changed: bool,
    verb: &str,
    left: &str,
    right: &str,
) -> Result<(), AppError> {
    if json {
        return print_json(&serde_json::json!({
            "left": left,
            "right": right,
            "action": verb,
            "changed": changed,
        }));
    }
    if changed {
        println!("{} {} and {}", verb, display_id(left), display_id(right));
    } else {
        println!("nothing to do: already {}", verb);
    }
    Ok(())
}

fn emit_work(work: &Work, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(work);
    }
    println!("{}", work_line(work));
    Ok(())
}

fn emit_artifact(artifact: &Artifact, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(artifact);
    }
    println!("{}", artifact_line(artifact));
    Ok(())
}

fn emit_group(group: &Group, json: bool) -> Result<(), AppError> {
    if json {
        return print_json(group);
    }
    println!("{}", group_line(group));
    Ok(())
}

fn work_line(work: &Work) -> String {
    format!(
        "{}  {:<6} {:<8} {:<11} {}",
        display_id(&work.id),
        work.schedule,
        work.metadata.priority,
        work.status(),
        work.title
    )
}

fn artifact_line(artifact: &Artifact) -> String {
    format!(
        "{}  {:<8} {}  [{}]",
        display_id(&artifact.id),
        artifact.artifact_type,
        artifact.summary,
        artifact.technical_tags.join(", ")
    )
}

fn group_line(group: &Group) -> String {
    format!(
        "{}  {:<12} {} members  readiness {:.2}  cohesion {:.2}  {}",
        display_id(&group.id),
        group.metadata.status,
        group.metadata.artifact_count,
        group.metadata.readiness_score,
        group.metadata.cohesion_score,
        group.name
    )
}

fn print_work_detail(work: &Work) {
    println!("{}", work_line(work));
    if !work.description.is_empty() {
        println!("{}", work.description);
    }
    println!("progress: {}%", work.metadata.progress);
    if !work.technical_tags.is_empty() {
        println!("tags: {}", work.technical_tags.join(", "));
    }
    if !work.artifact_refs().is_empty() {
        println!("artifacts: {}", work.artifact_refs().join(", "));
    }
    if let Some(path) = &work.file_path {
        println!("file: {}", path.display());
    }
    if !work.content.trim().is_empty() {
        println!();
        println!("{}", work.content.trim_end());
    }
}

fn print_decay(analysis: &DecayAnalysis) {
    let summary = &analysis.summary;
    println!(
        "health {:.2}: {} stale work, {} stale artifacts, {} orphaned, {} unsupported, {} stale groups",
        summary.health_score,
        summary.stale_work,
        summary.stale_artifacts,
        summary.orphaned_artifacts,
        summary.unsupported_work,
        summary.stale_groups
    );
    for action in &analysis.actions {
        println!(
            "  {:<6} {:<11} {:<8} {}  {}{}",
            action.priority,
            action.action_type,
            action.item_kind,
            display_id(&action.item_id),
            action.reason,
            if action.auto_safe { "  (auto)" } else { "" }
        );
    }
}
