mod archive;
mod clean;
mod scan;
mod style;

use std::{
    io::{IsTerminal as _, stdout},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use jiff::{SignedDuration, Timestamp};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, ConnectionDescriptor},
    engine::Failure,
    imap::{Client, ImapSession, TlsMode},
    session::{DryRun, Session},
};

use style::Styles;

const DEFAULT_DAYS: u32 = 365;
const ABORTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Only report what would change on the server
    #[arg(short, long, global = true)]
    pub dry_run: bool,
    /// Never color the output
    #[arg(long, global = true)]
    pub no_color: bool,
    /// Log more, repeat for even more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Config file to use instead of the default one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn color(&self) -> bool {
        !self.no_color
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the mailbox tree with message counts
    Scan(scan::ScanArgs),
    /// Move old messages into a per-year archive tree
    Move(archive::MoveArgs),
    /// Delete empty mailboxes
    Clean(clean::CleanArgs),
}

#[derive(Debug, clap::Args)]
pub struct ConnectArgs {
    /// How to secure the connection, defaults to implicit TLS
    #[arg(long, value_enum)]
    tls: Option<TlsMode>,
    /// user[:password]@host[:port]
    connect: ConnectionDescriptor,
}

impl Command {
    fn connect_args(&self) -> &ConnectArgs {
        match self {
            Self::Scan(args) => &args.connect,
            Self::Move(args) => &args.connect,
            Self::Clean(args) => &args.connect,
        }
    }
}

/// What is left to report once a command ran to its end.
#[derive(Debug, Default)]
pub struct Outcome {
    failures: Vec<Failure>,
    cancelled: bool,
}

impl Outcome {
    fn new(failures: Vec<Failure>, cancelled: bool) -> Self {
        Self {
            failures,
            cancelled,
        }
    }

    fn lost_connection(&self) -> bool {
        self.failures.iter().any(|failure| failure.error.is_fatal())
    }

    fn exit_status(&self) -> u8 {
        if self.cancelled || self.lost_connection() {
            ABORTED
        } else if self.failures.is_empty() {
            0
        } else {
            1
        }
    }

    fn report(&self, styles: &Styles) {
        let error = styles.error;
        for failure in &self.failures {
            eprintln!("{error}{}{error:#}: {}", failure.path, failure.error);
        }
        if self.cancelled {
            eprintln!("{error}aborted{error:#}: interrupted");
        } else if self.lost_connection() {
            eprintln!("{error}aborted{error:#}: lost the connection to the server");
        } else if !self.failures.is_empty() {
            eprintln!(
                "{error}completed with {} errors{error:#}",
                self.failures.len()
            );
        }
    }
}

pub async fn run(args: Args) -> ExitCode {
    let styles = Styles::new(args.color() && stdout().is_terminal());
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current mailbox");
            interrupt.cancel();
        }
    });

    match execute(&args, &styles, &cancel).await {
        Ok(outcome) => {
            outcome.report(&styles);
            ExitCode::from(outcome.exit_status())
        }
        Err(e) => {
            let error = styles.error;
            eprintln!("{error}aborted{error:#}: {e:#}");
            ExitCode::from(ABORTED)
        }
    }
}

async fn execute(args: &Args, styles: &Styles, cancel: &CancellationToken) -> Result<Outcome> {
    let config = Config::load(args.config.as_deref())?;
    let mut session = login(args.command.connect_args(), &config).await?;

    let outcome = if args.dry_run {
        info!("dry run, the server will not be changed");
        let mut dry_run = DryRun::new(session);
        let outcome = dispatch(&mut dry_run, &args.command, &config, styles, cancel).await;
        session = dry_run.into_inner();
        outcome
    } else {
        dispatch(&mut session, &args.command, &config, styles, cancel).await
    };
    session.logout().await;
    outcome
}

async fn dispatch<S: Session>(
    session: &mut S,
    command: &Command,
    config: &Config,
    styles: &Styles,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    match command {
        Command::Scan(args) => scan::scan(session, args, config, styles, cancel).await,
        Command::Move(args) => archive::archive(session, args, config, styles, cancel).await,
        Command::Clean(args) => clean::clean(session, args, styles, cancel).await,
    }
}

async fn login(args: &ConnectArgs, config: &Config) -> Result<ImapSession> {
    let descriptor = &args.connect;
    let tls = args.tls.or(config.tls()).unwrap_or_default();
    let password = password(descriptor, config)?;
    let client = Client::connect(descriptor.host(), descriptor.port(), tls)
        .await
        .with_context(|| format!("cannot connect to {}", descriptor.host()))?;
    client
        .login(descriptor.user(), &password)
        .await
        .with_context(|| format!("cannot log in as {}", descriptor.user()))
}

fn password(descriptor: &ConnectionDescriptor, config: &Config) -> Result<String> {
    if let Some(password) = descriptor.password() {
        return Ok(password.clone());
    }
    if let Some(password) = config.password() {
        return password.context("cannot get password from password_cmd");
    }
    rpassword::prompt_password(format!(
        "Password for {}@{}: ",
        descriptor.user(),
        descriptor.host()
    ))
    .context("cannot read password")
}

/// `days` before `now`, falling back to the configured age and then a year.
fn age_cutoff(now: Timestamp, days: Option<u32>, config: &Config) -> Result<Timestamp> {
    let days = days.or(config.days()).unwrap_or(DEFAULT_DAYS);
    now.checked_sub(SignedDuration::from_hours(i64::from(days) * 24))
        .with_context(|| format!("{days} days ago is out of range"))
}
