//! Shared utilities for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use regex::Regex;

/// Journal file names, current (`Journal.2024-01-15T203045.01.log`) and
/// legacy (`Journal.240115203045.01.log`) styles.
static JOURNAL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Journal\.(?:(?<current>\d{4}-\d{2}-\d{2}T\d{6})|(?<legacy>\d{12}))\.(?<part>\d{2})\.log$")
        .unwrap()
});

/// Format a duration in seconds as "Xh Ym", "Ym" or "Zs".
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "0m".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Format a rate with fewer decimals as it grows.
pub fn format_rate(rate: f64) -> String {
    if rate >= 10.0 {
        format!("{rate:.0}")
    } else if rate >= 1.0 {
        format!("{rate:.1}")
    } else {
        format!("{rate:.2}")
    }
}

/// Format credits with thousands separators.
#[allow(
    clippy::cast_possible_truncation,
    reason = "credit totals are far below i64::MAX"
)]
pub fn format_credits(credits: f64) -> String {
    let whole = credits.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        grouped.insert(0, '-');
    }
    format!("{grouped} CR")
}

/// Parses the creation time and part number embedded in a journal name.
///
/// Returns `None` for anything that is not a journal file.
fn journal_sort_key(name: &str) -> Option<(NaiveDateTime, u32)> {
    let caps = JOURNAL_NAME_RE.captures(name)?;
    let created = if let Some(stamp) = caps.name("current") {
        NaiveDateTime::parse_from_str(stamp.as_str(), "%Y-%m-%dT%H%M%S").ok()?
    } else {
        let stamp = caps.name("legacy")?;
        NaiveDateTime::parse_from_str(stamp.as_str(), "%y%m%d%H%M%S").ok()?
    };
    let part = caps.name("part")?.as_str().parse().ok()?;
    Some((created, part))
}

/// Returns the newest journal file in `dir`.
///
/// Journals are ordered by the creation time in their name, then by part
/// number. Legacy and current names compare by time, not by spelling.
pub fn find_latest_journal(dir: &Path) -> Result<PathBuf> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut latest: Option<((NaiveDateTime, u32), PathBuf)> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(key) = journal_sort_key(&name) else {
            continue;
        };
        if latest.as_ref().is_none_or(|(best, _)| key > *best) {
            latest = Some((key, entry.path()));
        }
    }

    latest
        .map(|(_, path)| path)
        .with_context(|| format!("no journal files found in {}", dir.display()))
}
