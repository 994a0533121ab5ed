//! Sessions command for listing recorded mining sessions.

use std::io::Write;

use anyhow::Result;
use ma_core::SessionSummary;
use ma_db::{Database, SessionRecord};
use serde::Serialize;

use super::util::{format_duration, format_rate};

/// JSON shape of one recorded session.
#[derive(Debug, Serialize)]
struct JsonSession<'a> {
    id: &'a str,
    recorded_at: String,
    source: Option<&'a str>,
    summary: &'a SessionSummary,
}

/// Writes the session table.
pub fn format_sessions<W: Write>(writer: &mut W, records: &[SessionRecord]) -> Result<()> {
    writeln!(writer, "RECORDED SESSIONS")?;
    writeln!(writer)?;

    if records.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Hint: Run 'ma replay --record <journal>' to store sessions."
        )?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<17} {:>8} {:>6} {:>7}  Location",
        "Start", "Duration", "Tons", "t/h"
    )?;
    writeln!(
        writer,
        "───────────────── ──────── ────── ───────  ────────────────────"
    )?;

    let mut total_tons = 0_i64;
    let mut total_seconds = 0_i64;
    for record in records {
        let summary = &record.summary;
        total_tons = total_tons.saturating_add(summary.total_tons);
        total_seconds = total_seconds.saturating_add(summary.duration_seconds);

        let location = summary
            .location
            .as_deref()
            .or(summary.system.as_deref())
            .unwrap_or("-");
        let rate = summary
            .tons_per_hour
            .map_or_else(|| "-".to_string(), format_rate);
        writeln!(
            writer,
            "{:<17} {:>8} {:>6} {rate:>7}  {location}",
            summary.start.format("%Y-%m-%d %H:%M").to_string(),
            format_duration(summary.duration_seconds),
            summary.total_tons,
        )?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "{} session(s), {total_tons} t total, {} mining",
        records.len(),
        format_duration(total_seconds)
    )?;
    Ok(())
}

/// Runs the sessions command.
pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let records = db.list_sessions()?;
    tracing::debug!(count = records.len(), "loaded recorded sessions");

    if json {
        let sessions: Vec<JsonSession<'_>> = records
            .iter()
            .map(|record| JsonSession {
                id: &record.id,
                recorded_at: record.recorded_at.to_rfc3339(),
                source: record.source.as_deref(),
                summary: &record.summary,
            })
            .collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&sessions)?)?;
    } else {
        format_sessions(writer, &records)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use insta::assert_snapshot;
    use ma_core::SessionState;
    use serde_json::Value;

    use super::*;

    fn summary(
        start: DateTime<Utc>,
        seconds: i64,
        tons: i64,
        location: Option<&str>,
    ) -> SessionSummary {
        let mut state = SessionState::default();
        state.mining_start = Some(start);
        state.mining_end = Some(start + Duration::seconds(seconds));
        state.mining_location = location.map(ToString::to_string);
        state.current_system = Some("Borann".to_string());
        if tons > 0 {
            state.cargo_totals.insert("platinum".to_string(), tons);
            state.cargo_additions.insert("platinum".to_string(), tons);
        }
        SessionSummary::capture(&mut state, start)
    }

    fn record(id: &str, summary: SessionSummary) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            recorded_at: Utc.with_ymd_and_hms(3310, 5, 4, 0, 0, 0).unwrap(),
            source: None,
            summary,
        }
    }

    #[test]
    fn sessions_table_layout() {
        let records = vec![
            record(
                "a",
                summary(
                    Utc.with_ymd_and_hms(3310, 5, 2, 18, 0, 0).unwrap(),
                    3600,
                    24,
                    Some("Borann A 2 A Ring"),
                ),
            ),
            record(
                "b",
                summary(
                    Utc.with_ymd_and_hms(3310, 5, 3, 9, 30, 0).unwrap(),
                    42,
                    0,
                    None,
                ),
            ),
        ];

        let mut output = Vec::new();
        format_sessions(&mut output, &records).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        RECORDED SESSIONS

        Start             Duration   Tons     t/h  Location
        ───────────────── ──────── ────── ───────  ────────────────────
        3310-05-02 18:00     1h 0m     24      24  Borann A 2 A Ring
        3310-05-03 09:30       42s      0       -  Borann

        2 session(s), 24 t total, 1h 0m mining
        ");
    }

    #[test]
    fn empty_history_prints_hint() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, false).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        RECORDED SESSIONS

        No sessions recorded.

        Hint: Run 'ma replay --record <journal>' to store sessions.
        ");
    }

    #[test]
    fn json_lists_recorded_sessions() {
        let mut db = Database::open_in_memory().unwrap();
        let start = Utc.with_ymd_and_hms(3310, 5, 2, 18, 0, 0).unwrap();
        db.insert_session(
            &summary(start, 1800, 12, Some("Borann A 2 A Ring")),
            Some("Journal.3310-05-02T175500.01.log"),
        )
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, true).unwrap();
        let json: Value = serde_json::from_slice(&output).unwrap();

        let sessions = json.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["source"], "Journal.3310-05-02T175500.01.log");
        assert_eq!(sessions[0]["summary"]["total_tons"], 12);
        assert_eq!(sessions[0]["summary"]["duration_seconds"], 1800);
    }
}
