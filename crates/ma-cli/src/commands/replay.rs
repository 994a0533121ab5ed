//! Replay command for summarizing mining sessions from journal files.
//!
//! This module implements `ma replay`, which feeds journal lines through the
//! session tracker in file order, collects a summary for every session that
//! ends, and optionally records them or values the cargo of the last one.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ma_core::journal::commodity_display_name;
use ma_core::location;
use ma_core::{
    JournalEntry, MarketLedger, PriceEstimate, SellTotals, SessionEvent, SessionObserver,
    SessionRecorder, SessionState, SessionSummary, SessionTracker, SharedState,
};
use ma_db::Database;
use ma_market::{MarketPreferences, MarketSearchService, PriceSource, SpanshClient};
use serde::Serialize;
use serde_json::{Map, Value};

use super::util::{find_latest_journal, format_credits, format_duration, format_rate};
use crate::Config;

/// Output switches for the replay command.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    pub json: bool,
    pub prices: bool,
}

/// A summarized session and the journal it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedSession {
    pub source: Option<String>,
    pub summary: SessionSummary,
}

/// Observer that captures a summary, timeline included, whenever a
/// session ends.
#[derive(Debug, Default)]
pub struct SessionCollector {
    current_source: Option<String>,
    recorder: SessionRecorder,
    finished: Vec<CollectedSession>,
}

impl SessionObserver for SessionCollector {
    fn on_session_end(&mut self, state: &SessionState) {
        let mut snapshot = state.clone();
        let end = state.mining_end.unwrap_or_else(Utc::now);
        let summary =
            SessionSummary::capture(&mut snapshot, end).with_events(self.recorder.take_events());
        self.finished.push(CollectedSession {
            source: self.current_source.clone(),
            summary,
        });
    }

    fn on_reset(&mut self, state: &SessionState) {
        self.recorder.on_reset(state);
    }

    fn on_event(&mut self, event: &SessionEvent, state: &SessionState) {
        self.recorder.on_event(event, state);
    }
}

// ========== Location Context ==========

/// Plays the part of the game client's status record during a replay.
///
/// Tracks the current star system and, where the journal reports one, the
/// body the ship is near.
#[derive(Debug, Default)]
struct LocationContext {
    shared: SharedState,
}

impl LocationContext {
    fn observe(&mut self, record: &Map<String, Value>) {
        if let Some(system) = location::detect_system(record) {
            self.shared
                .insert("StarSystem".to_string(), Value::String(system));
        }

        let event = record.get("event").and_then(Value::as_str).unwrap_or_default();
        match event {
            "FSDJump" | "CarrierJump" | "Location" | "SupercruiseExit" | "ApproachBody" => {
                match record
                    .get("Body")
                    .and_then(Value::as_str)
                    .filter(|body| !body.trim().is_empty())
                {
                    Some(body) => {
                        self.shared
                            .insert("Body".to_string(), Value::String(body.to_string()));
                    }
                    None => {
                        self.shared.remove("Body");
                    }
                }
            }
            "SupercruiseEntry" | "StartJump" | "LeaveBody" => {
                self.shared.remove("Body");
            }
            _ => {}
        }
    }
}

// ========== Replayer ==========

/// Result of replaying one or more journals.
#[derive(Debug)]
pub struct ReplayReport {
    /// Sessions that ended (entered supercruise) during the replay.
    pub finished: Vec<CollectedSession>,
    /// The session still running when the input ran out.
    pub in_progress: Option<CollectedSession>,
    /// Tracker state after the last line.
    pub final_state: SessionState,
    /// Lines that were not valid JSON.
    pub skipped_lines: usize,
}

/// Feeds journal lines through a [`SessionTracker`].
#[derive(Debug)]
pub struct Replayer {
    tracker: SessionTracker<SessionCollector>,
    context: LocationContext,
    skipped_lines: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Replayer {
    pub fn new(state: SessionState) -> Self {
        Self {
            tracker: SessionTracker::new(state, SessionCollector::default()),
            context: LocationContext::default(),
            skipped_lines: 0,
            last_timestamp: None,
        }
    }

    /// Tags sessions ending from now on with the given journal name.
    pub fn set_source(&mut self, source: Option<String>) {
        self.tracker.observer_mut().current_source = source;
    }

    pub const fn state(&self) -> &SessionState {
        self.tracker.state()
    }

    /// Processes one journal line. Blank lines are ignored and invalid JSON
    /// is counted and skipped.
    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            return;
        }
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                self.skipped_lines += 1;
                tracing::debug!(error = %err, "skipping invalid journal line");
                return;
            }
        };

        let entry = JournalEntry::decode(&raw);
        if let Some(timestamp) = entry.timestamp {
            // Stands in for the refresh timer between events.
            self.tracker.tick(timestamp);
            self.last_timestamp = Some(timestamp);
        }
        if let Some(record) = raw.as_object() {
            self.context.observe(record);
        }
        self.tracker.apply(&entry, Some(&self.context.shared));
    }

    pub fn feed_reader<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            self.feed_line(&line?);
        }
        Ok(())
    }

    /// Ends the replay. A session still running is summarized as of the
    /// last journal timestamp.
    pub fn finish(self) -> ReplayReport {
        let Self {
            tracker,
            skipped_lines,
            last_timestamp,
            ..
        } = self;
        let (mut final_state, mut collector) = tracker.into_parts();

        let in_progress = if final_state.is_mining {
            let now = last_timestamp.unwrap_or_else(Utc::now);
            Some(CollectedSession {
                source: collector.current_source.clone(),
                summary: SessionSummary::capture(&mut final_state, now)
                    .with_events(collector.recorder.take_events()),
            })
        } else {
            None
        };

        ReplayReport {
            finished: collector.finished,
            in_progress,
            final_state,
            skipped_lines,
        }
    }
}

// ========== Cargo Valuation ==========

/// Best sell prices found for the cargo hold.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CargoValue {
    pub prices: BTreeMap<String, PriceEstimate>,
    pub totals: SellTotals,
}

/// Looks up a sell price for every commodity in the hold and values it.
///
/// Lookups that fail or find nothing simply leave the commodity unpriced.
pub fn estimate_cargo_value<S: PriceSource>(
    source: S,
    prefs: &MarketPreferences,
    state: &SessionState,
) -> Result<CargoValue> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let service = MarketSearchService::new(source, MarketLedger::new(), prefs.clone());

    runtime.block_on(async {
        for handle in service.request_cargo_prices(state) {
            if let Err(err) = handle.await {
                tracing::debug!(error = %err, "price lookup task failed");
            }
        }
    });

    let ledger = service.ledger();
    let prices = state
        .cargo_totals
        .keys()
        .filter_map(|commodity| {
            ledger
                .price(commodity)
                .map(|estimate| (commodity.clone(), estimate))
        })
        .collect();

    Ok(CargoValue {
        prices,
        totals: ledger.sell_totals(&state.cargo_totals),
    })
}

// ========== Human-Readable Output ==========

fn section<W: Write>(writer: &mut W, heading: &str) -> io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{heading}")?;
    writeln!(writer, "{}", "─".repeat(heading.chars().count()))
}

fn field<W: Write>(writer: &mut W, label: &str, value: &str) -> io::Result<()> {
    writeln!(writer, "{:<12} {value}", format!("{label}:"))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_tph(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |rate| format!("{} t/h", format_rate(rate)))
}

/// Writes the report for one session.
pub fn write_session<W: Write>(
    writer: &mut W,
    title: &str,
    session: &CollectedSession,
) -> io::Result<()> {
    let summary = &session.summary;

    writeln!(writer, "{title}")?;
    writeln!(writer, "{}", "─".repeat(title.chars().count()))?;
    field(writer, "Started", &format_time(summary.start))?;
    field(
        writer,
        "Ended",
        &format!(
            "{} ({})",
            format_time(summary.end),
            format_duration(summary.duration_seconds)
        ),
    )?;
    if let Some(location) = &summary.location {
        field(writer, "Location", location)?;
    }
    if let Some(system) = &summary.system {
        field(writer, "System", system)?;
    }
    if let Some(source) = &session.source {
        field(writer, "Journal", source)?;
    }
    let rate = summary
        .tons_per_hour
        .map(|rate| format!(" ({} t/h)", format_rate(rate)))
        .unwrap_or_default();
    field(writer, "Refined", &format!("{} t{rate}", summary.total_tons))?;

    section(writer, "PROSPECTING")?;
    field(
        writer,
        "Asteroids",
        &format!(
            "{} ({} duplicates, {} already mined)",
            summary.prospected.total, summary.prospected.duplicates, summary.prospected.already_mined
        ),
    )?;
    let content = summary
        .content
        .iter()
        .map(|(level, count)| format!("{level} {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    field(writer, "Content", &content)?;

    if !summary.commodities.is_empty() {
        section(writer, "COMMODITIES")?;
        for (commodity, stats) in &summary.commodities {
            let name = commodity_display_name(commodity);
            let yields = match (stats.min_yield, stats.avg_yield, stats.max_yield) {
                (Some(min), Some(avg), Some(max)) => {
                    format!("yield {min:.1}-{max:.1}%, avg {avg:.1}%")
                }
                _ => "no prospect data".to_string(),
            };
            writeln!(
                writer,
                "  {name:<20} {:>5} t  {:>9}  {} asteroids ({:.1}%)  {yields}",
                stats.tons,
                format_tph(stats.tons_per_hour),
                stats.asteroids_prospected,
                stats.percentage_of_asteroids,
            )?;
        }
    }

    if !summary.yield_histogram.is_empty() {
        section(writer, "YIELD HISTOGRAM")?;
        for (material, bins) in &summary.yield_histogram {
            let bins = bins
                .iter()
                .map(|bin| format!("{}={}", bin.label(), bin.count))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(writer, "  {}: {bins}", commodity_display_name(material))?;
        }
    }

    section(writer, "LIMPETS")?;
    let drones = &summary.drones;
    field(
        writer,
        "Prospectors",
        &format!(
            "{} launched, {} lost",
            drones.prospectors_launched, drones.prospectors_lost
        ),
    )?;
    field(
        writer,
        "Collectors",
        &format!(
            "{} launched, {} abandoned",
            drones.collectors_launched, drones.collectors_abandoned
        ),
    )?;
    field(
        writer,
        "Remaining",
        &drones
            .limpets_remaining
            .map_or_else(|| "-".to_string(), |count| count.to_string()),
    )?;

    section(writer, "REFINING")?;
    let refinement = &summary.refinement;
    field(
        writer,
        "Rate",
        &format!(
            "{}/min now, {}/min peak ({}s window)",
            format_rate(refinement.current_rpm),
            format_rate(refinement.max_rpm),
            refinement.lookback_seconds
        ),
    )?;

    if !summary.materials.is_empty() {
        section(writer, "MATERIALS")?;
        for (material, count) in &summary.materials {
            writeln!(writer, "  {} x{count}", commodity_display_name(material))?;
        }
    }

    Ok(())
}

fn write_value<W: Write>(
    writer: &mut W,
    value: &CargoValue,
    cargo: &BTreeMap<String, i64>,
) -> io::Result<()> {
    section(writer, "ESTIMATED VALUE")?;
    if cargo.is_empty() {
        return writeln!(writer, "No cargo to value.");
    }
    for (commodity, tons) in cargo {
        let name = commodity_display_name(commodity);
        match value.prices.get(commodity) {
            Some(price) => writeln!(
                writer,
                "  {name:<20} {tons:>5} t x {}  {} ({})",
                format_credits(price.sell_price),
                price.station_name,
                price.system_name
            )?,
            None => writeln!(writer, "  {name:<20} {tons:>5} t  no market found")?,
        }
    }
    field(writer, "Total", &format_credits(value.totals.total))
}

fn write_text<W: Write>(
    writer: &mut W,
    report: &ReplayReport,
    recorded: Option<usize>,
    value: Option<&CargoValue>,
) -> io::Result<()> {
    if report.finished.is_empty() && report.in_progress.is_none() {
        writeln!(writer, "No mining sessions found.")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Hint: a session starts when a prospector limpet is launched."
        )?;
    }

    for (index, session) in report.finished.iter().enumerate() {
        if index > 0 {
            writeln!(writer)?;
        }
        write_session(writer, &format!("SESSION {}", index + 1), session)?;
    }
    if let Some(session) = &report.in_progress {
        if !report.finished.is_empty() {
            writeln!(writer)?;
        }
        write_session(writer, "SESSION IN PROGRESS", session)?;
    }

    if let Some(value) = value {
        write_value(writer, value, &report.final_state.cargo_totals)?;
    }
    if report.skipped_lines > 0 {
        writeln!(writer)?;
        writeln!(writer, "Skipped {} invalid line(s).", report.skipped_lines)?;
    }
    if let Some(count) = recorded {
        writeln!(writer)?;
        writeln!(writer, "Recorded {count} new session(s).")?;
    }
    Ok(())
}

// ========== JSON Output ==========

#[derive(Debug, Serialize)]
struct JsonReplay<'a> {
    sessions: &'a [CollectedSession],
    in_progress: Option<&'a CollectedSession>,
    skipped_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    recorded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cargo_value: Option<&'a CargoValue>,
}

// ========== Public Interface ==========

fn resolve_inputs(config: &Config, files: &[PathBuf], latest: bool) -> Result<Vec<PathBuf>> {
    if !latest {
        anyhow::ensure!(!files.is_empty(), "no journal files given");
        return Ok(files.to_vec());
    }
    let dir = config
        .journal_dir
        .as_deref()
        .context("no journal directory configured (set journal_dir or MA_JOURNAL_DIR)")?;
    let path = find_latest_journal(dir)?;
    tracing::info!(path = %path.display(), "replaying latest journal");
    Ok(vec![path])
}

fn record_sessions(db: &mut Database, sessions: &[CollectedSession]) -> Result<usize> {
    let mut recorded = 0;
    for session in sessions {
        if db
            .insert_session(&session.summary, session.source.as_deref())?
            .is_some()
        {
            recorded += 1;
        }
    }
    Ok(recorded)
}

/// Runs the replay command.
///
/// Sessions are only stored when a database is given.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    files: &[PathBuf],
    latest: bool,
    options: ReplayOptions,
    db: Option<&mut Database>,
) -> Result<()> {
    let inputs = resolve_inputs(config, files, latest)?;

    let mut replayer = Replayer::new(config.session_state());
    for path in &inputs {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        tracing::debug!(path = %path.display(), "replaying journal");
        replayer.set_source(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        );
        replayer
            .feed_reader(BufReader::new(file))
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    let report = replayer.finish();
    if report.skipped_lines > 0 {
        tracing::warn!(skipped = report.skipped_lines, "skipped invalid journal lines");
    }

    let recorded = match db {
        Some(db) => Some(record_sessions(db, &report.finished)?),
        None => None,
    };

    let value = if options.prices {
        let client = SpanshClient::new().context("failed to build market client")?;
        Some(estimate_cargo_value(
            client,
            &config.market,
            &report.final_state,
        )?)
    } else {
        None
    };

    if options.json {
        let output = JsonReplay {
            sessions: &report.finished,
            in_progress: report.in_progress.as_ref(),
            skipped_lines: report.skipped_lines,
            recorded,
            cargo_value: value.as_ref(),
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        write_text(writer, &report, recorded, value.as_ref())?;
    }

    Ok(())
}
