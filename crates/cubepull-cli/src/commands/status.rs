use anyhow::Result;
use chrono::{Local, NaiveDate};
use colored::Colorize;

use cubepull_core::{Checkpoint, CheckpointStore, DateRange};

use crate::config::ProjectConfig;

pub fn cmd_status(config: ProjectConfig) -> Result<()> {
    let store = config.open_store()?;
    let checkpoint = store.load()?;
    let today = Local::now().date_naive();

    print!("{}", render_status(&checkpoint, today));
    Ok(())
}

fn render_status(checkpoint: &Checkpoint, today: NaiveDate) -> String {
    let mut out = String::new();
    let range = DateRange::pending(checkpoint, today);

    out.push_str("\nCheckpoint Status:\n");
    out.push_str(&format!("{:<16} {}\n", "Last pull", checkpoint.last_pull));

    if range.is_empty() {
        out.push_str(&format!("{:<16} {}\n", "Pending", "up to date".green()));
    } else {
        out.push_str(&format!(
            "{:<16} {} .. {} ({} date(s))\n",
            "Pending",
            range.start(),
            range.end(),
            range.len()
        ));
    }

    if checkpoint.missing_dates.is_empty() {
        out.push_str(&format!("{:<16} {}\n", "Missing", "none".green()));
    } else {
        out.push_str(&format!(
            "{:<16} {}\n",
            "Missing",
            format!("{} date(s)", checkpoint.missing_dates.len()).red()
        ));
        for date in &checkpoint.missing_dates {
            out.push_str(&format!("  {}\n", date.to_string().yellow()));
        }
    }

    out.push('\n');
    out
}
