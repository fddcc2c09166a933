use std::env;
use std::process;

use clap::Parser;
use sesh::cli::{Cli, Commands, SessionCommands};
use sesh::commands::{
    self, Activation, CleanMode, CleanOptions, CloneOptions, Context, ListOptions, Output,
    SwitchOptions,
};
use sesh::config::{self, ConfigOverrides};
use sesh::{Error, Result, logging};
use tracing::debug;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let log_dir = config::config_dir().ok();
    let guard = logging::init(log_dir.as_deref(), cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            debug!(error = ?e, "command failed");
            if human {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            }
            1
        }
    };

    // process::exit skips destructors; flush the log file first
    drop(guard);
    process::exit(code);
}

/// Run the command, returning the exit code. Bulk commands that partly
/// failed print their result and exit with 1.
fn run(cli: Cli) -> Result<i32> {
    let human = cli.human_readable;
    let config_dir = config::config_dir()?;

    let mut overrides = ConfigOverrides::new();
    if let Some(dir) = cli.workspace {
        overrides = overrides.with_workspace_dir(dir);
    }
    if let Some(kind) = cli.backend {
        overrides = overrides.with_session_backend(kind);
    }
    let resolved = config::resolve_config(&config_dir, &overrides)?;
    let mut ctx = Context::from_config(&resolved, &config_dir)?;
    let cwd = env::current_dir()?;
    debug!(
        workspace = %ctx.workspace.root().display(),
        backend = %ctx.backend.name(),
        "context ready"
    );

    match cli.command {
        Commands::Clone { url, name } => {
            let result = commands::clone(&mut ctx, &url, &CloneOptions { name })?;
            output(&result, human);
        }

        Commands::Switch {
            branch,
            create,
            project,
        } => {
            let options = SwitchOptions::new(branch).create(create).project(project);
            let activation = commands::switch(&mut ctx, &options, &cwd)?;
            enter(activation, human)?;
        }

        Commands::Pop => {
            let activation = commands::pop(&mut ctx)?;
            enter(activation, human)?;
        }

        Commands::Delete {
            branch,
            project,
            force,
            keep_session,
            all,
        } => {
            if all {
                let result =
                    commands::delete_project(&mut ctx, project.as_deref(), &cwd, force)?;
                output(&result, human);
                if !result.removed {
                    return Ok(1);
                }
            } else {
                let branch = branch.ok_or_else(|| {
                    Error::InvalidInput("a branch or --all is required".to_string())
                })?;
                let result = commands::delete_worktree(
                    &mut ctx,
                    project.as_deref(),
                    &cwd,
                    &branch,
                    force,
                    keep_session,
                )?;
                output(&result, human);
            }
        }

        Commands::Session { command } => match command {
            SessionCommands::Kill { name } => {
                output(&commands::kill_session(&ctx, &name)?, human);
            }
        },

        Commands::Fetch { all, project } => {
            if all {
                let result = commands::fetch_all(&mut ctx)?;
                output(&result, human);
                if result.failure_count() > 0 {
                    return Ok(1);
                }
            } else {
                output(&commands::fetch(&mut ctx, project.as_deref(), &cwd)?, human);
            }
        }

        Commands::List {
            projects,
            project,
            current_project,
            running,
            plain,
        } => {
            if projects {
                output(&commands::list_projects(&ctx)?, human);
            } else {
                let options = ListOptions {
                    project,
                    current_project,
                    running,
                };
                let result = commands::list(&ctx, &options, &cwd)?;
                if plain {
                    for session in result.session_names() {
                        println!("{}", session);
                    }
                } else {
                    output(&result, human);
                }
            }
        }

        Commands::Info { target, project } => {
            let result = match project {
                Some(project) => commands::branch_info(&ctx, &project, &target)?,
                None => commands::session_info(&ctx, &target)?,
            };
            output(&result, human);
        }

        Commands::Branches { project } => {
            let (project, stream) = commands::branches(&ctx, project.as_deref(), &cwd)?;
            if human {
                for branch in stream {
                    println!("{}", branch?);
                }
            } else {
                output(&commands::collect_branches(&project, stream)?, human);
            }
        }

        Commands::Clean {
            orphaned,
            remote_deleted: _,
            project,
            dry_run,
        } => {
            let options = CleanOptions {
                mode: if orphaned {
                    CleanMode::Orphaned
                } else {
                    CleanMode::RemoteDeleted
                },
                project,
                dry_run,
            };
            let result = commands::clean(&mut ctx, &options, &cwd)?;
            output(&result, human);
            if !result.failures.is_empty() {
                return Ok(1);
            }
        }

        Commands::Status => {
            output(&commands::status(&ctx, &resolved, &cwd)?, human);
        }
    }

    Ok(0)
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Report the activation, then attach. Nothing is printed when the process
/// is about to be replaced by the multiplexer client.
fn enter(activation: Activation, human: bool) -> Result<()> {
    if !activation.replaces_process() {
        output(&activation, human);
    }
    activation.enter()
}
