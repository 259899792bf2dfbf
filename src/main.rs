use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use verman::config::{ConfigStore, JsonConfigStore};
use verman::domain::{BumpKind, Project, ProjectType, RemoteDescriptor, RemoteSyncState};
use verman::error::{Result, VermanError};
use verman::git::repository::Git2Repository;
use verman::git::{platform_from_url, repo_slug_from_url, GitRepository};
use verman::parser::{BlenderAddonParser, ParserRegistry};
use verman::publish::PublisherRegistry;
use verman::services::{Packager, PublishOrchestrator, VersionService};
use verman::ui;

#[derive(Parser)]
#[command(
    name = "verman",
    about = "Version bookkeeping and release publication for multi-remote projects"
)]
struct Args {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current version of a project
    ResolveVersion {
        path: PathBuf,
        #[arg(long = "type", help = "Project convention (detected when omitted)")]
        project_type: Option<String>,
    },
    /// Bump the version and rewrite the version file
    BumpVersion {
        path: PathBuf,
        #[arg(help = "major, minor or patch")]
        kind: String,
        #[arg(long = "type", help = "Project convention (detected when omitted)")]
        project_type: Option<String>,
    },
    /// Sync remotes, package and publish releases
    Publish {
        path: PathBuf,
        #[arg(short, long, help = "Commit local changes with this message first")]
        message: Option<String>,
    },
    /// Fetch all remotes and report ahead/behind state
    Sync {
        path: PathBuf,
        #[arg(long, help = "Pull with rebase from remotes we are behind")]
        rebase: bool,
    },
    /// Verify tokens can reach the configured release repositories
    Check { path: PathBuf },
    /// List release archives built for a project
    Archives { path: PathBuf },
    /// Detect the project convention
    Detect { path: PathBuf },
    /// Create an initial version file at 0.0.1
    Init {
        path: PathBuf,
        #[arg(long = "type", help = "Project convention (detected when omitted)")]
        project_type: Option<String>,
    },
    /// List configured projects
    Projects,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    match run(args.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            ui::display_error(&e.to_string());
            std::process::exit(if e.is_recoverable() { 1 } else { 2 });
        }
    }
}

fn run(command: Command) -> Result<i32> {
    let registry = ParserRegistry::with_builtin_parsers();

    match command {
        Command::ResolveVersion { path, project_type } => {
            let ty = resolve_type(&registry, &path, project_type.as_deref())?;
            let service = VersionService::new(&registry);
            let info = service.version_info(&path, ty)?;
            ui::display_version_info(&info);
            Ok(0)
        }

        Command::BumpVersion {
            path,
            kind,
            project_type,
        } => {
            let kind: BumpKind = kind.parse()?;
            let ty = resolve_type(&registry, &path, project_type.as_deref())?;
            let service = VersionService::new(&registry);
            let version = service.bump_version(&path, ty, kind)?;
            ui::display_success(&format!("version is now {}", version));
            Ok(0)
        }

        Command::Publish { path, message } => {
            let config = JsonConfigStore::new()?;
            let project = load_project(&config, &registry, &path)?;
            let repo = Git2Repository::open(&project.path)?;

            let service = VersionService::new(&registry);
            let version = service
                .get_version(&project.path, project.project_type)?
                .ok_or_else(|| {
                    VermanError::config(format!(
                        "no version recorded for {}; run bump-version first",
                        project.path.display()
                    ))
                })?;

            let mut packager = Packager::new(
                &project.path,
                display_name(&project),
                archive_dir(&config, &project),
            );
            for pattern in &project.exclude {
                packager.add_exclude(pattern.clone());
            }

            let publishers = PublisherRegistry::with_builtin_publishers();
            let orchestrator = PublishOrchestrator::new(&project, &repo, &publishers, &config)
                .with_progress(ui::display_progress);
            let outcome = orchestrator.run(version, message.as_deref(), &packager);

            ui::display_outcome(&outcome);
            Ok(outcome.exit_code())
        }

        Command::Sync { path, rebase } => {
            let repo = Git2Repository::open(&path)?;
            let branch = repo
                .current_branch()?
                .unwrap_or_else(|| "main".to_string());
            let has_local_changes = repo.local_changes()?;

            let mut fetch_errors = std::collections::HashMap::new();
            for remote in repo.remotes()? {
                if let Err(e) = repo.fetch(&remote.name) {
                    fetch_errors.insert(remote.name.clone(), e.to_string());
                }
            }

            // Re-read after fetching so ahead/behind counts are fresh.
            let mut any_failed = false;
            for remote in repo.remotes()? {
                let state = RemoteSyncState {
                    remote: remote.name.clone(),
                    has_local_changes,
                    ahead: remote.ahead,
                    behind: remote.behind,
                    last_fetch_error: fetch_errors.remove(&remote.name),
                };
                any_failed |= state.last_fetch_error.is_some();
                ui::display_remote_state(&state);

                if rebase && state.last_fetch_error.is_none() && state.behind.unwrap_or(0) > 0 {
                    let (clean, conflicts) = repo.pull_rebase(&remote.name, &branch)?;
                    if clean {
                        ui::display_success(&format!("rebased onto {}/{}", remote.name, branch));
                    } else {
                        any_failed = true;
                        ui::display_error(&format!(
                            "rebase onto {}/{} stopped on conflicts:",
                            remote.name, branch
                        ));
                        for path in conflicts {
                            ui::display_status(&format!("  {}", path.display()));
                        }
                    }
                }
            }
            Ok(if any_failed { 1 } else { 0 })
        }

        Command::Check { path } => {
            let config = JsonConfigStore::new()?;
            let project = load_project(&config, &registry, &path)?;
            let publishers = PublisherRegistry::with_builtin_publishers();

            let mut any_failed = false;
            for platform in &project.publish_to {
                let Some(token) = config.token(platform) else {
                    any_failed = true;
                    ui::display_error(&format!("{}: no token configured", platform));
                    continue;
                };
                let options = verman::publish::PublisherOptions {
                    base_url: if platform == "gitea" {
                        config.gitea_url()
                    } else {
                        None
                    },
                    timeout: None,
                };
                let Some(publisher) = publishers.get(platform, &token, &options)? else {
                    any_failed = true;
                    ui::display_error(&format!("{}: platform not available", platform));
                    continue;
                };
                let Some(slug) = project.repos.get(platform) else {
                    any_failed = true;
                    ui::display_error(&format!("{}: no repository configured", platform));
                    continue;
                };
                match publisher.validate_config(slug) {
                    Ok(()) => ui::display_success(&format!("{}: {} reachable", platform, slug)),
                    Err(e) => {
                        any_failed = true;
                        ui::display_error(&format!("{}: {}", platform, e));
                    }
                }
            }
            Ok(if any_failed { 1 } else { 0 })
        }

        Command::Archives { path } => {
            let config = JsonConfigStore::new()?;
            let project = load_project(&config, &registry, &path)?;
            let packager = Packager::new(
                &project.path,
                display_name(&project),
                archive_dir(&config, &project),
            );
            let history = packager.archive_history()?;
            if history.is_empty() {
                ui::display_status("no archives yet");
                return Ok(0);
            }
            for entry in history {
                println!("{}  {}  {} bytes", entry.version, entry.path.display(), entry.size);
            }
            Ok(0)
        }

        Command::Detect { path } => match registry.detect(&path) {
            Some(parser) => {
                ui::display_success(&format!("detected: {}", parser.project_type()));
                Ok(0)
            }
            None => {
                ui::display_status("no known convention detected");
                Ok(0)
            }
        },

        Command::Init { path, project_type } => {
            let ty = resolve_type(&registry, &path, project_type.as_deref())?;
            let service = VersionService::new(&registry);
            let file = service.create_version_file(&path, ty)?;
            ui::display_success(&format!("created {}", file.display()));
            Ok(0)
        }

        Command::Projects => {
            let config = JsonConfigStore::new()?;
            let projects = config.projects();
            if projects.is_empty() {
                ui::display_status("no projects configured");
                return Ok(0);
            }
            let service = VersionService::new(&registry);
            for project in projects {
                let version = service
                    .get_version(&project.path, project.project_type)
                    .ok()
                    .flatten()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  {}",
                    project.path.display(),
                    project.project_type,
                    version
                );
            }
            Ok(0)
        }
    }
}

/// Archive name for a project: Blender addons use the `bl_info` display
/// name, everything else the directory name.
fn display_name(project: &Project) -> String {
    if project.project_type == ProjectType::BlenderAddon {
        if let Some(name) = BlenderAddonParser::addon_name(&project.path) {
            return name;
        }
    }
    project.name()
}

/// Where a project's archives live: the configured directory, the
/// project's parent, or the project itself as a last resort.
fn archive_dir(config: &JsonConfigStore, project: &Project) -> PathBuf {
    config
        .archive_dir()
        .or_else(|| project.path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| project.path.clone())
}

/// Project type from the explicit flag, falling back to detection.
fn resolve_type(
    registry: &ParserRegistry,
    path: &Path,
    explicit: Option<&str>,
) -> Result<ProjectType> {
    match explicit {
        Some(name) => name.parse(),
        None => registry
            .detect(path)
            .map(|parser| parser.project_type())
            .ok_or_else(|| {
                VermanError::config(format!(
                    "cannot detect project type at {}; pass --type",
                    path.display()
                ))
            }),
    }
}

/// The configured project for `path`, or an ad-hoc one from detection when
/// it is not registered (sync-only publish, no release platforms).
fn load_project(
    config: &JsonConfigStore,
    registry: &ParserRegistry,
    path: &Path,
) -> Result<Project> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if let Some(project) = config.project(&canonical) {
        return Ok(project);
    }

    let ty = resolve_type(registry, &canonical, None)?;
    let mut project = Project::new(canonical, ty);

    // Derive remotes and release slugs from the repository itself.
    if let Ok(repo) = Git2Repository::open(&project.path) {
        if let Ok(remotes) = repo.remotes() {
            for remote in remotes {
                let platform = platform_from_url(&remote.url);
                if let (Some(platform), Some(slug)) =
                    (platform, repo_slug_from_url(&remote.url))
                {
                    project.repos.entry(platform.to_string()).or_insert(slug);
                }
                project.remotes.push(RemoteDescriptor {
                    name: remote.name,
                    url: remote.url,
                    platform: platform.map(str::to_string),
                });
            }
        }
    }
    Ok(project)
}
