//! Predicates for selecting record subsets.
//!
//! A record matches a criteria set iff it matches every member. The
//! criteria operate on raw ledger rows through [`RowView`], so they can
//! address any schema field by name, not just the mandatory three.

use bon::bon;
use chrono::NaiveDateTime;

use super::error::{LedgerError, Result};
use super::schema::{FIELD_INFO, FIELD_STATE_TIME, RowView};
use super::{STATE_TIME_FORMAT, UNSET};

#[derive(Debug, Clone)]
pub enum Criteria {
    /// Exact identifier match, tolerant of short local identifiers: a
    /// needle without a `:` separator is compared against the segment
    /// after the record identifier's last `:` only.
    Identifier { needle: String },
    /// Exact match on the state field.
    State { state: String },
    /// Bounded match on a datetime field.
    Datetime(Datetime),
    /// Substring containment on a configurable field.
    Text { needle: String, field: String },
}

impl Criteria {
    pub fn identifier(needle: impl Into<String>) -> Self {
        Criteria::Identifier {
            needle: needle.into(),
        }
    }

    pub fn state(state: impl Into<String>) -> Self {
        Criteria::State {
            state: state.into(),
        }
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Self::text_in(needle, FIELD_INFO)
    }

    pub fn text_in(needle: impl Into<String>, field: impl Into<String>) -> Self {
        Criteria::Text {
            needle: needle.into(),
            field: field.into(),
        }
    }

    pub fn matches(&self, row: &RowView<'_>) -> Result<bool> {
        match self {
            Criteria::Identifier { needle } => {
                let mut record_id = row.identifier();
                if !needle.contains(':') {
                    if let Some(pos) = record_id.rfind(':') {
                        record_id = &record_id[pos + 1..];
                    }
                }
                Ok(needle == record_id)
            }
            Criteria::State { state } => Ok(state == row.state()),
            Criteria::Datetime(datetime) => datetime.matches(row),
            Criteria::Text { needle, field } => {
                let value = row.get(field).ok_or_else(|| LedgerError::UnknownField {
                    field: field.clone(),
                    known: Vec::new(),
                })?;
                Ok(value.contains(needle.as_str()))
            }
        }
    }
}

impl From<Datetime> for Criteria {
    fn from(datetime: Datetime) -> Self {
        Criteria::Datetime(datetime)
    }
}

/// Datetime window over a configurable field, by default the state-time
/// field in the ledger's own format. The lower bound is inclusive, the
/// upper exclusive; a record whose field is unset never matches, and with
/// no bound at all nothing matches.
#[derive(Debug, Clone)]
pub struct Datetime {
    field: String,
    format: String,
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
}

#[bon]
impl Datetime {
    #[builder]
    pub fn new(
        #[builder(into)] field: Option<String>,
        #[builder(into)] format: Option<String>,
        #[builder(into)] from: Option<String>,
        #[builder(into)] to: Option<String>,
    ) -> Result<Self> {
        let field = field.unwrap_or_else(|| FIELD_STATE_TIME.to_owned());
        let format = format.unwrap_or_else(|| STATE_TIME_FORMAT.to_owned());
        let from = from.map(|bound| parse_bound(&bound, &format)).transpose()?;
        let to = to.map(|bound| parse_bound(&bound, &format)).transpose()?;
        Ok(Self {
            field,
            format,
            from,
            to,
        })
    }

    fn matches(&self, row: &RowView<'_>) -> Result<bool> {
        let value = row.get(&self.field).ok_or_else(|| LedgerError::UnknownField {
            field: self.field.clone(),
            known: Vec::new(),
        })?;
        if value == UNSET {
            return Ok(false);
        }
        let stamp = parse_bound(value, &self.format)?;
        let matched = match (self.from, self.to) {
            (Some(from), None) => stamp >= from,
            (Some(from), Some(to)) => stamp >= from && stamp < to,
            (None, Some(to)) => stamp < to,
            (None, None) => false,
        };
        Ok(matched)
    }
}

fn parse_bound(value: &str, format: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format).map_err(|_| LedgerError::BadTimestamp {
        value: value.to_owned(),
        format: format.to_owned(),
    })
}
