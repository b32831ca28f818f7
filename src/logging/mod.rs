mod connected_to_journal;

use std::{io::Write as _, time::SystemTime};

use anstyle::{AnsiColor, Effects};
use connected_to_journal::connected_to_journal;
use env_logger::{Env, WriteStyle};
use log::Level;

/// Filter used when `RUST_LOG` is not set, by number of `-v` flags.
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn journal_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

pub fn init(verbosity: u8, color: bool) {
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_filter(verbosity)));
    if connected_to_journal() {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "<{}>{}: {}",
                journal_priority(record.level()),
                record.target(),
                record.args()
            )
        });
    } else {
        if !color {
            builder.write_style(WriteStyle::Never);
        }
        let subtle = AnsiColor::BrightBlack.on_default();
        builder.format(move |buf, record| {
            let now = SystemTime::now();
            write!(buf, "{subtle}[{subtle:#}")?;
            if let Ok(now) = jiff::Timestamp::try_from(now) {
                write!(buf, "{now:.3} ")?;
            } else {
                write!(buf, "timestamp_error ")?;
            }
            let level_style = match record.level() {
                Level::Error => AnsiColor::Red.on_default().effects(Effects::BOLD),
                Level::Warn => AnsiColor::Yellow.on_default(),
                Level::Info => AnsiColor::Green.on_default(),
                Level::Debug => AnsiColor::Blue.on_default(),
                Level::Trace => AnsiColor::Cyan.on_default(),
            };
            write!(
                buf,
                "{level_style}{}{level_style:#} {}",
                record.level(),
                record.target(),
            )?;
            if let Some(line) = record.line() {
                write!(buf, ":{line}")?;
            }
            write!(buf, "{subtle}]{subtle:#} ")?;
            writeln!(buf, "{}", record.args())
        });
    }
    builder.init();
}
