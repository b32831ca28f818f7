use anyhow::{Context as _, Result};
use jiff::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{ConnectArgs, Outcome, age_cutoff, style::Styles},
    config::Config,
    engine::{Counts, MailboxStats, Scanner},
    session::Session,
};

const PATH_WIDTH: usize = 40;

#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Only scan this mailbox and what is below it
    #[arg(short, long, default_value = "")]
    pub mailbox: String,
    /// Only show the tree, without counting messages
    #[arg(short, long)]
    pub list_only: bool,
}

pub async fn scan<S: Session>(
    session: &mut S,
    args: &ScanArgs,
    config: &Config,
    styles: &Styles,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let cutoff = age_cutoff(Timestamp::now(), None, config)?;
    let mut scanner = Scanner::start(session, &args.mailbox, args.list_only, cutoff, cancel.clone())
        .await
        .context("cannot scan mailboxes")?;

    println!("{}", header(styles));
    let mut failures = Vec::new();
    while let Some(record) = scanner.next().await {
        match record {
            Ok(stats) => println!("{}", row(&stats, styles)),
            Err(failure) => {
                let fatal = failure.error.is_fatal();
                failures.push(failure);
                if fatal {
                    break;
                }
            }
        }
    }
    Ok(Outcome::new(failures, scanner.was_cancelled()))
}

fn header(styles: &Styles) -> String {
    let header = styles.header;
    format!(
        "{header}{:<PATH_WIDTH$} {:>8} {:>8} {:>8}{header:#}",
        "mailbox", "total", "seen", "old"
    )
}

fn row(stats: &MailboxStats, styles: &Styles) -> String {
    let label = format!(
        "{}{}",
        "  ".repeat(stats.depth.saturating_sub(1)),
        stats.path
    );
    let Some(Counts { total, seen, old }) = stats.counts else {
        let placeholder = styles.placeholder;
        return format!("{placeholder}{label}{placeholder:#}");
    };
    let style = if old > 0 {
        styles.old
    } else {
        anstyle::Style::new()
    };
    format!("{label:<PATH_WIDTH$} {total:>8} {seen:>8} {style}{old:>8}{style:#}")
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_row_indents_by_depth() {
        let stats = MailboxStats {
            path: "INBOX.Friends.Joe".to_string(),
            depth: 2,
            counts: Some(Counts {
                total: 12,
                seen: 10,
                old: 3,
            }),
        };

        let row = row(&stats, &Styles::new(false));

        assert!(row.starts_with("  INBOX.Friends.Joe "));
        assert!(row.ends_with("      12       10        3"));
    }

    #[rstest]
    fn test_row_without_counts_is_just_the_path() {
        let stats = MailboxStats {
            path: "INBOX.Friends".to_string(),
            depth: 1,
            counts: None,
        };

        assert_eq!(row(&stats, &Styles::new(false)), "INBOX.Friends");
    }
}
