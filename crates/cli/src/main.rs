//! Fairpick CLI - fair, load-balanced reviewer picking for small teams.

mod identity;

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use fairpick_core::{CurrentUser, UserId};
use fairpick_session::{ChooseOutcome, RosterManager, SelectionSession, SessionConfig};
use fairpick_storage::{JsonStorage, SelectionStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Session = SelectionSession<JsonStorage>;

#[derive(Parser)]
#[command(name = "fairpick")]
#[command(about = "Pick a reviewer fairly from your team", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage path for Fairpick data
    #[arg(short, long, default_value = ".fairpick", global = true)]
    store: PathBuf,

    /// Seed for tie-breaking, for reproducible picks
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in as a team member (lists members when no ID is given)
    SignIn {
        /// User ID
        id: Option<String>,
    },
    /// Sign out
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// Manage the team roster
    Team {
        #[command(subcommand)]
        action: TeamCommand,
    },
    /// Choose a reviewer at random among the least-picked teammates
    Choose,
    /// Show how often you have picked each teammate
    Counts,
    /// Add one to a teammate's count
    Bump {
        /// User ID
        id: String,
    },
    /// Take one off a teammate's count
    Drop {
        /// User ID
        id: String,
    },
    /// Keep a session open and read commands from stdin
    Shell,
    /// Print your counts again whenever the team or counts change (Ctrl-C to stop)
    Watch,
}

#[derive(Subcommand)]
enum TeamCommand {
    /// List everyone, archived members last
    List,
    /// Add a member
    Add {
        /// Display name
        name: String,
    },
    /// Rename a member
    Rename {
        /// User ID
        id: String,
        /// New display name
        name: String,
    },
    /// Archive a member
    Archive {
        /// User ID
        id: String,
    },
    /// Bring back an archived member
    Unarchive {
        /// User ID
        id: String,
    },
}

/// One line typed into the shell.
#[derive(Parser)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    // Open storage
    let storage = Arc::new(JsonStorage::new(&cli.store).await?);
    let config = SessionConfig { rng_seed: cli.seed };

    match cli.command {
        Commands::SignIn { id } => sign_in(&storage, &cli.store, id).await?,
        Commands::SignOut => {
            identity::clear(&cli.store).await?;
            println!("Signed out");
        }
        Commands::Whoami => match identity::load(&cli.store).await? {
            Some(user) => println!("{} ({})", user.name, user.id),
            None => println!("Not signed in"),
        },
        Commands::Team { action } => team(&RosterManager::new(storage.clone()), action).await?,
        Commands::Shell => {
            let current = signed_in(&cli.store).await?;
            let session = SelectionSession::open(storage.clone(), current, config).await?;
            shell(storage, session).await?;
        }
        Commands::Watch => {
            let current = signed_in(&cli.store).await?;
            let mut session = SelectionSession::open(storage, current, config).await?;
            println!("Watching counts for {}. Press Ctrl-C to stop.", session.current_user().name);
            watch(&mut session, tokio::signal::ctrl_c()).await?;
        }
        command => {
            let current = signed_in(&cli.store).await?;
            let mut session = SelectionSession::open(storage, current, config).await?;
            selection(&mut session, command).await?;
        }
    }

    Ok(())
}

async fn signed_in(store_root: &Path) -> Result<CurrentUser> {
    identity::load(store_root)
        .await?
        .ok_or_else(|| anyhow!("Not signed in; run `fairpick sign-in` first"))
}

async fn sign_in(storage: &JsonStorage, store_root: &Path, id: Option<String>) -> Result<()> {
    let Some(id) = id else {
        let users = storage.list_users(None, false).await?;
        if users.is_empty() {
            println!("No team members yet; add one with `fairpick team add <name>`");
        }
        for user in users {
            println!("  {} | {}", user.id, user.name);
        }
        return Ok(());
    };

    let user = storage
        .load_user(parse_id(&id)?)
        .await?
        .filter(|u| !u.is_archived)
        .ok_or_else(|| anyhow!("No active team member with ID {}", id))?;

    identity::save(store_root, &user.as_current()).await?;
    println!("Signed in as {}", user.name);
    Ok(())
}

async fn team(roster: &RosterManager<JsonStorage>, action: TeamCommand) -> Result<()> {
    match action {
        TeamCommand::List => {
            let users = roster.roster().await?;
            println!("Team ({})", users.len());
            for user in users {
                println!(
                    "  {} | {}{}",
                    user.id,
                    user.name,
                    if user.is_archived { " (archived)" } else { "" }
                );
            }
        }
        TeamCommand::Add { name } => {
            let user = roster.add(&name).await?;
            println!("Added {} ({})", user.name, user.id);
        }
        TeamCommand::Rename { id, name } => {
            let user = roster.rename(parse_id(&id)?, &name).await?;
            println!("Renamed to {}", user.name);
        }
        TeamCommand::Archive { id } => {
            let user = roster.set_archived(parse_id(&id)?, true).await?;
            println!("Archived {}", user.name);
        }
        TeamCommand::Unarchive { id } => {
            let user = roster.set_archived(parse_id(&id)?, false).await?;
            println!("Unarchived {}", user.name);
        }
    }
    Ok(())
}

async fn selection(session: &mut Session, command: Commands) -> Result<()> {
    match command {
        Commands::Choose => match session.choose().await? {
            ChooseOutcome::Chosen { reviewer, count } => {
                println!("{} has been randomly chosen as your reviewer ({})", reviewer.name, count);
            }
            ChooseOutcome::NoEligibleCandidates => println!("No available reviewers"),
        },
        Commands::Counts => print_counts(session),
        Commands::Bump { id } => {
            let id = parse_id(&id)?;
            let count = session.increment(id).await?;
            println!("{}: {}", display_name(session, id), count);
        }
        Commands::Drop { id } => {
            let id = parse_id(&id)?;
            let count = session.decrement(id).await?;
            println!("{}: {}", display_name(session, id), count);
        }
        _ => return Err(anyhow!("Not available here")),
    }
    Ok(())
}

async fn shell(storage: Arc<JsonStorage>, mut session: Session) -> Result<()> {
    let roster = RosterManager::new(storage);
    let mut watch = session.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Signed in as {}. Type `help` for commands, `quit` to leave.", session.current_user().name);
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            _ => match ShellLine::try_parse_from(words.iter().copied()) {
                Ok(ShellLine { command: Commands::Team { action } }) => {
                    if let Err(e) = team(&roster, action).await {
                        println!("Error: {}", e);
                    }
                }
                Ok(ShellLine {
                    command:
                        Commands::SignIn { .. } | Commands::SignOut | Commands::Shell | Commands::Watch,
                }) => println!("Not available inside the shell"),
                Ok(ShellLine { command: Commands::Whoami }) => {
                    let me = session.current_user();
                    println!("{} ({})", me.name, me.id);
                }
                Ok(ShellLine { command }) => {
                    if let Err(e) = selection(&mut session, command).await {
                        println!("Error: {}", e);
                    }
                }
                Err(e) => println!("{}", e),
            },
        }

        match session.sync_pending(&mut watch).await {
            Ok(true) => debug!("Session refreshed after changes"),
            Ok(false) => {}
            Err(e) => println!("Could not refresh: {}", e),
        }
        prompt()?;
    }

    watch.unsubscribe();
    Ok(())
}

/// Print standings after every change until `stop` resolves.
///
/// Returns how many changes were shown.
async fn watch<F: Future>(session: &mut Session, stop: F) -> Result<usize> {
    let mut watch = session.watch();
    let mut shown = 0;
    print_counts(session);

    tokio::pin!(stop);
    loop {
        let change = tokio::select! {
            _ = &mut stop => None,
            change = session.next_change(&mut watch) => Some(change),
        };

        match change {
            Some(Ok(Some(event))) => {
                debug!("Refreshed after {} change", event.table);
                shown += 1;
                println!();
                print_counts(session);
            }
            Some(Ok(None)) => {
                println!("Store closed");
                break;
            }
            Some(Err(e)) => println!("Could not refresh: {}", e),
            None => break,
        }
    }

    watch.unsubscribe();
    Ok(shown)
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn print_counts(session: &Session) {
    let standings = session.standings();
    if standings.is_empty() {
        println!("No available reviewers");
        return;
    }
    for standing in standings {
        println!("  {} | {}: {}", standing.user.id, standing.user.name, standing.count);
    }
}

fn display_name(session: &Session, id: UserId) -> String {
    session
        .snapshot()
        .users
        .iter()
        .find(|u| u.id == id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn parse_id(s: &str) -> Result<UserId> {
    s.parse().map_err(|_| anyhow!("Invalid user ID: {}", s))
}
