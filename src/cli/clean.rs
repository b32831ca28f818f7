use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{ConnectArgs, Outcome, style::Styles},
    engine,
    session::Session,
};

#[derive(Debug, clap::Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Mailbox whose empty descendants get deleted, it stays itself
    pub mailbox: String,
}

pub async fn clean<S: Session>(
    session: &mut S,
    args: &CleanArgs,
    styles: &Styles,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let report = engine::prune(session, &args.mailbox, cancel)
        .await
        .with_context(|| format!("cannot clean {}", args.mailbox))?;
    let success = styles.success;
    for path in &report.deleted {
        println!("{success}deleted{success:#} {path}");
    }
    Ok(Outcome::new(report.failures, report.cancelled))
}
