//! Ledger owner: loads one record file, indexes it and persists mutations.
//!
//! Every mutating operation rewrites the whole file from the in-memory raw
//! lines right after updating the in-memory structures — there is no
//! separate commit step, the last successful full rewrite wins. Within one
//! handler all mutations are serialized by the caller's own call order;
//! across processes the file is a single-writer resource by convention.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bon::bon;
use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use super::criteria::Criteria;
use super::error::{LedgerError, Result};
use super::info;
use super::record::Record;
use super::schema::{FIELD_INFO, RowView, Schema};
use super::{COMMENT_MARK, MARK_FRAME, MARK_LOCK, STATE_TIME_FORMAT, UNSET};

/// One parsed data row and the position of its backing raw line.
#[derive(Debug, Clone)]
struct Row {
    raw_idx: usize,
    values: Vec<String>,
}

pub struct RecordHandler {
    path: PathBuf,
    schema: Schema,
    mark_open: String,
    mark_lock: String,
    time_format: String,
    raw_lines: Vec<String>,
    rows: Vec<Row>,
    index: HashMap<String, usize>,
    position: Option<String>,
}

#[bon]
impl RecordHandler {
    /// Load a ledger file.
    ///
    /// When `fields` is supplied it must equal the file's header token for
    /// token, otherwise construction fails. Row width is validated against
    /// the schema for every data line.
    #[builder]
    pub fn new(
        #[builder(into)] path: PathBuf,
        fields: Option<Vec<String>>,
        #[builder(into)] mark_open: Option<String>,
        #[builder(into)] mark_lock: Option<String>,
        #[builder(into)] time_format: Option<String>,
    ) -> Result<Self> {
        let raw = fs::read_to_string(&path)?;
        let raw_lines: Vec<String> = raw.lines().map(str::to_owned).collect();
        let header_line = raw_lines
            .iter()
            .find(|line| is_data_row(line))
            .ok_or_else(|| LedgerError::EmptyLedger(path.display().to_string()))?;
        let file_schema = Schema::from_header_line(header_line)?;
        let schema = match fields {
            Some(fields) => {
                let explicit = Schema::new(fields)?;
                if explicit != file_schema {
                    return Err(LedgerError::HeaderMismatch {
                        expected: explicit.fields().to_vec(),
                        found: file_schema.fields().to_vec(),
                    });
                }
                explicit
            }
            None => file_schema,
        };
        let mut handler = Self {
            path,
            schema,
            mark_open: mark_open.unwrap_or_else(|| UNSET.to_owned()),
            mark_lock: mark_lock.unwrap_or_else(|| MARK_LOCK.to_owned()),
            time_format: time_format.unwrap_or_else(|| STATE_TIME_FORMAT.to_owned()),
            raw_lines,
            rows: Vec::new(),
            index: HashMap::new(),
            position: None,
        };
        handler.build_rows()?;
        debug!(path = %handler.path.display(), records = handler.len(), "ledger loaded");
        Ok(handler)
    }
}

impl RecordHandler {
    /// Load with the default marks and timestamp format.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().path(path.into()).build()
    }

    fn build_rows(&mut self) -> Result<()> {
        for (raw_idx, line) in self.raw_lines.iter().enumerate() {
            if !is_data_row(line) || line.trim_start().starts_with(self.schema.identifier_field())
            {
                continue;
            }
            let values: Vec<String> = line.trim().split('\t').map(str::to_owned).collect();
            if values.len() != self.schema.len() {
                return Err(LedgerError::RowShape {
                    line: raw_idx + 1,
                    expected: self.schema.len(),
                    got: values.len(),
                });
            }
            let identifier = values[0].clone();
            let row_idx = self.rows.len();
            self.rows.push(Row { raw_idx, values });
            self.index.insert(identifier, row_idx);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn mark_open(&self) -> &str {
        &self.mark_open
    }

    pub fn mark_lock(&self) -> &str {
        &self.mark_lock
    }

    /// Progress marker of the latest [`Self::next_record`] hit, as
    /// `position/total` (1-based).
    pub fn position(&self) -> Option<&str> {
        self.position.as_deref()
    }

    /// First record in file order whose state equals `state` (default: the
    /// open mark). Does not mutate — leasing is an explicit
    /// [`Self::save_record_state`] call.
    pub fn next_record(&mut self, state: Option<&str>) -> Option<Record> {
        let state = state.unwrap_or(self.mark_open.as_str());
        let state_pos = self.schema.state_pos();
        let total = self.rows.len();
        let hit = self
            .rows
            .iter()
            .position(|row| row.values[state_pos] == state)?;
        self.position = Some(format!("{:04}/{:04}", hit + 1, total));
        Some(Record::from_row(&self.schema, &self.rows[hit].values))
    }

    /// First record with exactly this identifier, without changing state.
    pub fn get(&self, identifier: &str) -> Option<Record> {
        self.rows
            .iter()
            .find(|row| row.values[0] == identifier)
            .map(|row| Record::from_row(&self.schema, &row.values))
    }

    /// Like [`Self::get`], but also accepts a trailing segment of the
    /// identifier (or any substring of it).
    pub fn get_partial(&self, identifier: &str) -> Option<Record> {
        self.rows
            .iter()
            .find(|row| row.values[0].ends_with(identifier) || row.values[0].contains(identifier))
            .map(|row| Record::from_row(&self.schema, &row.values))
    }

    /// The sole mutation primitive: set the record's state (default: the
    /// lock mark), stamp the state time with the current wall clock, apply
    /// any extra field overrides and rewrite the file.
    pub fn save_record_state(
        &mut self,
        identifier: &str,
        state: Option<&str>,
        overrides: &[(&str, &str)],
    ) -> Result<()> {
        let state = state.unwrap_or(self.mark_lock.as_str()).to_owned();
        let row_idx = *self
            .index
            .get(identifier)
            .ok_or_else(|| LedgerError::NotFound {
                identifier: identifier.to_owned(),
                path: self.path.display().to_string(),
            })?;
        let mut positions = Vec::with_capacity(overrides.len());
        for (field, _) in overrides {
            let pos = self
                .schema
                .position(field)
                .ok_or_else(|| LedgerError::UnknownField {
                    field: (*field).to_owned(),
                    known: self.schema.fields().to_vec(),
                })?;
            positions.push(pos);
        }
        let stamp = Local::now().format(&self.time_format).to_string();
        let state_pos = self.schema.state_pos();
        let ts_pos = self.schema.state_time_pos();
        {
            let row = &mut self.rows[row_idx];
            for (pos, (_, value)) in positions.iter().zip(overrides) {
                row.values[*pos] = (*value).to_owned();
            }
            row.values[state_pos] = state;
            row.values[ts_pos] = stamp;
        }
        let raw_idx = self.rows[row_idx].raw_idx;
        self.raw_lines[raw_idx] = self.rows[row_idx].values.join("\t");
        debug!(identifier, path = %self.path.display(), "record state saved");
        self.persist()
    }

    /// Evaluate every record against the AND of `criteria` (default:
    /// state equals the open mark) and return the match count. Unless
    /// `dry_run`, every match's state is set to `set_state` (default: the
    /// open mark) and the file rewritten. `verbose` lists the matches
    /// tab-delimited on stdout.
    ///
    /// Bulk transitions deliberately leave the state-time field untouched;
    /// only [`Self::save_record_state`] stamps it.
    pub fn states(
        &mut self,
        criteria: &[Criteria],
        set_state: Option<&str>,
        dry_run: bool,
        verbose: bool,
    ) -> Result<usize> {
        let fallback;
        let active: &[Criteria] = if criteria.is_empty() {
            fallback = [Criteria::state(self.mark_open.clone())];
            &fallback
        } else {
            criteria
        };
        let set_state = set_state.unwrap_or(self.mark_open.as_str()).to_owned();
        let mut matched = Vec::new();
        for (row_idx, row) in self.rows.iter().enumerate() {
            let view = RowView::new(&self.schema, &row.values);
            let mut all = true;
            for criterion in active {
                if !criterion.matches(&view)? {
                    all = false;
                    break;
                }
            }
            if all {
                matched.push(row_idx);
            }
        }
        if !dry_run {
            let state_pos = self.schema.state_pos();
            for &row_idx in &matched {
                self.rows[row_idx].values[state_pos] = set_state.clone();
                let raw_idx = self.rows[row_idx].raw_idx;
                self.raw_lines[raw_idx] = self.rows[row_idx].values.join("\t");
            }
            self.persist()?;
        }
        if verbose {
            self.report(&matched);
        }
        Ok(matched.len())
    }

    fn report(&self, matched: &[usize]) {
        if matched.is_empty() {
            return;
        }
        println!();
        println!("{}", self.schema.header_line());
        for &row_idx in matched {
            println!("{}", self.rows[row_idx].values.join("\t"));
        }
    }

    /// Partition the ledger into an active window `[start, start+size)`
    /// (1-based, inclusive of `start`) and write a new file next to the
    /// source, with the state of every record outside the window
    /// overwritten to `mark`. The source file and this handler stay
    /// untouched.
    pub fn frame(
        &self,
        start: usize,
        size: Option<usize>,
        mark: Option<&str>,
        sort_by: Option<&str>,
    ) -> Result<PathBuf> {
        let size = size.unwrap_or(1000);
        let mark = mark.unwrap_or(MARK_FRAME);
        let window_start = start.saturating_sub(1);
        let remaining = self.rows.len().saturating_sub(window_start);
        let window_end = if size > remaining {
            self.rows.len()
        } else {
            window_start + size
        };
        let state_pos = self.schema.state_pos();
        let mut out_rows: Vec<Vec<String>> = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let mut values = row.values.clone();
            if row_idx < window_start || row_idx >= window_end {
                values[state_pos] = mark.to_owned();
            }
            out_rows.push(values);
        }
        if let Some(field) = sort_by {
            let pos = self
                .schema
                .position(field)
                .ok_or_else(|| LedgerError::UnknownField {
                    field: field.to_owned(),
                    known: self.schema.fields().to_vec(),
                })?;
            out_rows.sort_by(|a, b| a[pos].cmp(&b[pos]));
        }
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("records");
        let (stem, ext) = match file_name.split_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (file_name, "csv"),
        };
        let out_name = format!("{stem}_{start:02}_{window_end:02}.{ext}");
        let out_path = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(out_name);
        let mut buffer = self.schema.header_line();
        buffer.push('\n');
        for values in &out_rows {
            buffer.push_str(&values.join("\t"));
            buffer.push('\n');
        }
        fs::write(&out_path, buffer)?;
        info!(path = %out_path.display(), window_start = start, window_end, "ledger frame written");
        Ok(out_path)
    }

    /// Merge another ledger into this one, newer-wins.
    ///
    /// For every record of `other`: unknown identifiers "miss" and are
    /// appended unless `append_unknown` is off; known identifiers "match"
    /// and are merged only when the local record is still open or the
    /// candidate's state time is strictly greater (string comparison, an
    /// unset local time loses to everything). A candidate in
    /// `ignore_state` is recorded as ignored to protect local results from
    /// stale remotes; with `require_state` set, candidates in any other
    /// state are skipped entirely. Duplicate identifiers in `other` are
    /// not deduplicated — each candidate re-runs against the possibly
    /// already-updated local record.
    pub fn merges(&mut self, other: &RecordHandler, options: &MergeOptions) -> Result<MergeOutcome> {
        if self.schema != other.schema {
            return Err(LedgerError::HeaderMismatch {
                expected: self.schema.fields().to_vec(),
                found: other.schema.fields().to_vec(),
            });
        }
        let state_pos = self.schema.state_pos();
        let ts_pos = self.schema.state_time_pos();
        let info_pos = self.schema.position(FIELD_INFO);
        let mut groups = MergeGroups::default();
        for other_row in &other.rows {
            let other_ident = other_row.values[0].as_str();
            let other_state = other_row.values[state_pos].as_str();
            let Some(&row_idx) = self.index.get(other_ident) else {
                groups.misses.push(other_row.values.clone());
                if options.append_unknown {
                    groups.appendeds.push(other_row.values.clone());
                    if !options.dry_run {
                        let raw_idx = self.raw_lines.len();
                        self.raw_lines.push(other_row.values.join("\t"));
                        let new_row_idx = self.rows.len();
                        self.rows.push(Row {
                            raw_idx,
                            values: other_row.values.clone(),
                        });
                        self.index.insert(other_ident.to_owned(), new_row_idx);
                    }
                }
                continue;
            };
            groups.matches.push(other_row.values.clone());
            let replaceable = {
                let own = &self.rows[row_idx].values;
                own[state_pos] == self.mark_open
                    || other_is_newer(&own[ts_pos], &other_row.values[ts_pos])
            };
            if !replaceable {
                continue;
            }
            if let Some(ignore) = &options.ignore_state {
                if other_state == ignore.as_str() {
                    groups.ignores.push(other_row.values.clone());
                    continue;
                }
            }
            if let Some(require) = &options.require_state {
                if other_state == require.as_str() {
                    groups.requireds.push(other_row.values.clone());
                } else {
                    continue;
                }
            }
            if !options.dry_run {
                {
                    let own = &mut self.rows[row_idx];
                    own.values[state_pos] = other_row.values[state_pos].clone();
                    own.values[ts_pos] = other_row.values[ts_pos].clone();
                    if let Some(pos) = info_pos {
                        let merged = info::merge_raw(&own.values[pos], &other_row.values[pos]);
                        own.values[pos] = merged;
                    }
                }
                let raw_idx = self.rows[row_idx].raw_idx;
                self.raw_lines[raw_idx] = self.rows[row_idx].values.join("\t");
                groups.merges.push(other_row.values.clone());
            }
        }
        if !options.dry_run {
            self.persist()?;
        }
        if options.verbose {
            groups.report(&self.schema);
        }
        let outcome = groups.outcome();
        info!(path = %self.path.display(), %outcome, dry_run = options.dry_run, "ledger merge finished");
        Ok(outcome)
    }

    /// Merge a ledger file, loaded with this handler's schema.
    pub fn merges_path(
        &mut self,
        other_path: impl Into<PathBuf>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        let other = RecordHandler::builder()
            .path(other_path.into())
            .fields(self.schema.fields().to_vec())
            .build()?;
        self.merges(&other, options)
    }

    fn persist(&self) -> Result<()> {
        let mut out = self.raw_lines.join("\n");
        out.push('\n');
        fs::write(&self.path, out)?;
        Ok(())
    }
}

fn is_data_row(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with(COMMENT_MARK)
}

fn other_is_newer(own_ts: &str, other_ts: &str) -> bool {
    if own_ts == UNSET {
        return true;
    }
    other_ts > own_ts
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Only candidates in exactly this state are applicable at all.
    pub require_state: Option<String>,
    /// Candidates in this state are recorded as ignored instead of merged.
    pub ignore_state: Option<String>,
    /// Append candidates with unknown identifiers to this ledger.
    pub append_unknown: bool,
    /// Count only, change nothing. On by default — merging is destructive.
    pub dry_run: bool,
    /// List every group on stdout instead of just counting.
    pub verbose: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            require_state: None,
            ignore_state: Some(UNSET.to_owned()),
            append_unknown: true,
            dry_run: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub matches: usize,
    pub merges: usize,
    pub misses: usize,
    pub ignores: usize,
    pub requireds: usize,
    pub appendeds: usize,
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matches={} merges={} misses={} ignores={} requireds={} appendeds={}",
            self.matches, self.merges, self.misses, self.ignores, self.requireds, self.appendeds
        )
    }
}

#[derive(Debug, Default)]
struct MergeGroups {
    matches: Vec<Vec<String>>,
    merges: Vec<Vec<String>>,
    misses: Vec<Vec<String>>,
    ignores: Vec<Vec<String>>,
    requireds: Vec<Vec<String>>,
    appendeds: Vec<Vec<String>>,
}

impl MergeGroups {
    fn outcome(&self) -> MergeOutcome {
        MergeOutcome {
            matches: self.matches.len(),
            merges: self.merges.len(),
            misses: self.misses.len(),
            ignores: self.ignores.len(),
            requireds: self.requireds.len(),
            appendeds: self.appendeds.len(),
        }
    }

    fn report(&self, schema: &Schema) {
        let groups = [
            ("MATCHES", &self.matches),
            ("MERGES", &self.merges),
            ("MISSES", &self.misses),
            ("IGNORES", &self.ignores),
            ("REQUIREDS", &self.requireds),
            ("APPENDEDS", &self.appendeds),
        ];
        for (label, rows) in groups {
            println!("### {label} ({}) ###", rows.len());
            if rows.is_empty() {
                continue;
            }
            println!("{}", schema.header_line());
            for values in rows {
                println!("{}", values.join("\t"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::schema::legacy_fields;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_ledger(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "IDENTIFIER\tSETSPEC\tCREATED\tINFO\tSTATE\tSTATE_TIME").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_header_read_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(
            &dir,
            "list.tsv",
            &["oai:host:1\tn.a.\tn.a.\tn.a.\tn.a.\tn.a."],
        );
        let handler = RecordHandler::load(&path).unwrap();
        assert_eq!(handler.schema().fields(), legacy_fields());
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn test_explicit_fields_must_match_header() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(
            &dir,
            "list.tsv",
            &["oai:host:1\tn.a.\tn.a.\tn.a.\tn.a.\tn.a."],
        );
        let result = RecordHandler::builder()
            .path(&path)
            .fields(vec!["IDENTIFIER".into(), "STATE".into(), "STATE_TIME".into()])
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("invalid fields"));
    }

    #[test]
    fn test_short_row_rejected_at_load() {
        let dir = TempDir::new().unwrap();
        let path = write_ledger(&dir, "list.tsv", &["oai:host:1\tn.a.\tn.a."]);
        let result = RecordHandler::load(&path);
        assert!(matches!(
            result,
            Err(LedgerError::RowShape {
                line: 2,
                expected: 6,
                got: 3
            })
        ));
    }

    #[test]
    fn test_comments_and_blanks_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.tsv");
        fs::write(
            &path,
            "# exported 2021-08-03\nIDENTIFIER\tINFO\tSTATE\tSTATE_TIME\n\noai:host:1\tn.a.\tn.a.\tn.a.\n",
        )
        .unwrap();
        let mut handler = RecordHandler::load(&path).unwrap();
        handler.save_record_state("oai:host:1", None, &[]).unwrap();
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with("# exported 2021-08-03\nIDENTIFIER"));
        assert!(rewritten.contains("\n\noai:host:1\tn.a.\tbusy\t"));
    }
}
