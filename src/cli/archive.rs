use anyhow::{Context as _, Result, bail};
use jiff::{Timestamp, civil::Date, tz::TimeZone};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{ConnectArgs, Outcome, age_cutoff, style::Styles},
    config::Config,
    engine::{self, ArchiveOptions, Moved},
    session::Session,
};

#[derive(Debug, clap::Args)]
pub struct MoveArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Mailboxes whose own messages stay where they are
    #[arg(short, long, value_delimiter = ',')]
    pub omit: Vec<String>,
    /// Move messages received before 1 January of this year
    #[arg(short, long, conflicts_with = "days")]
    pub year: Option<i16>,
    /// Move messages older than this many days [default: 365]
    #[arg(long)]
    pub days: Option<u32>,
    /// Mailbox to move messages out of, including everything below it
    pub from: String,
    /// Root of the archive tree
    pub to: String,
}

pub async fn archive<S: Session>(
    session: &mut S,
    args: &MoveArgs,
    config: &Config,
    styles: &Styles,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    if args.to.is_empty() {
        bail!("the archive root must not be empty");
    }
    let cutoff = match args.year {
        Some(year) => start_of_year(year)?,
        None => age_cutoff(Timestamp::now(), args.days, config)?,
    };
    let mut omit = args.omit.clone();
    omit.extend(config.omit().iter().cloned());
    let options = ArchiveOptions::new(&args.to, cutoff).omitting(omit);

    let report = engine::archive(session, &args.from, &options, cancel)
        .await
        .with_context(|| format!("cannot archive {}", args.from))?;
    for moved in &report.moved {
        println!("{}", row(moved, styles));
    }
    Ok(Outcome::new(report.failures, report.cancelled))
}

/// Midnight UTC on the first day of `year`.
fn start_of_year(year: i16) -> Result<Timestamp> {
    let start = Date::new(year, 1, 1)
        .and_then(|date| date.to_zoned(TimeZone::UTC))
        .with_context(|| format!("{year} is not a usable year"))?;
    Ok(start.timestamp())
}

fn row(moved: &Moved, styles: &Styles) -> String {
    let success = styles.success;
    format!(
        "{success}{:>6}{success:#} {} -> {} ({})",
        moved.count, moved.source, moved.destination, moved.year
    )
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_start_of_year() {
        let start = assert_ok!(start_of_year(2014));

        assert_eq!(start.to_string(), "2014-01-01T00:00:00Z");
    }

    #[rstest]
    fn test_row() {
        let moved = Moved {
            source: "INBOX.Friends.Joe".to_string(),
            year: 2013,
            destination: "Archive.2013.Friends.Joe".to_string(),
            count: 4,
        };

        assert_eq!(
            row(&moved, &Styles::new(false)),
            "     4 INBOX.Friends.Joe -> Archive.2013.Friends.Joe (2013)"
        );
    }
}
