//! One unit of work: a persistent identifier plus its lifecycle state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::Local;

use super::error::{LedgerError, Result};
use super::info::Info;
use super::schema::{
    FIELD_CREATED, FIELD_IDENTIFIER, FIELD_INFO, FIELD_SPEC, FIELD_STATE, FIELD_STATE_TIME, Schema,
};
use super::{STATE_TIME_FORMAT, UNSET};

/// Record keyed by a persistent URN-like identifier, e.g.
/// `oai:opendata.uni-halle.de:1981185920/34265`.
///
/// Only the identifier is mandatory at construction; set spec, creation
/// time, payload and state all start out unset.
#[derive(Debug, Clone)]
pub struct Record {
    identifier: String,
    pub set_spec: String,
    pub created_time: String,
    pub info: Info,
    state: String,
    state_time: String,
    local_identifier: OnceLock<String>,
}

impl Record {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            set_spec: UNSET.to_owned(),
            created_time: UNSET.to_owned(),
            info: Info::Unset,
            state: UNSET.to_owned(),
            state_time: UNSET.to_owned(),
            local_identifier: OnceLock::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn state_time(&self) -> &str {
        &self.state_time
    }

    /// Set a new state and stamp the state time with the current wall clock.
    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = state.into();
        self.state_time = Local::now().format(STATE_TIME_FORMAT).to_string();
    }

    /// Filesystem-safe name derived from the identifier: the segment after
    /// the last `:`, with `/` replaced by `_`. Computed once and cached.
    pub fn local_identifier(&self) -> &str {
        self.local_identifier.get_or_init(|| {
            let mut local = self.identifier.as_str();
            if let Some(pos) = local.rfind(':') {
                local = &local[pos + 1..];
            }
            local.replace('/', "_")
        })
    }

    /// Build a record from a schema-aligned ledger row.
    ///
    /// The caller guarantees the row width matches the schema; the three
    /// mandatory roles are positional, the optional fields are looked up by
    /// name and left unset when absent or blank.
    pub(crate) fn from_row(schema: &Schema, values: &[String]) -> Self {
        let mut record = Record::new(values[0].clone());
        if let Some(pos) = schema.position(FIELD_SPEC) {
            let value = values[pos].trim();
            if !value.is_empty() {
                record.set_spec = value.to_owned();
            }
        }
        if let Some(pos) = schema.position(FIELD_CREATED) {
            let value = values[pos].trim();
            if !value.is_empty() {
                record.created_time = value.to_owned();
            }
        }
        if let Some(pos) = schema.position(FIELD_INFO) {
            record.info = Info::decode(&values[pos]);
        }
        record.state = values[schema.state_pos()].clone();
        record.state_time = values[schema.state_time_pos()].clone();
        record
    }

    /// Serialize into the flat field-name → value mapping used at the HTTP
    /// boundary.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (FIELD_IDENTIFIER.to_owned(), self.identifier.clone()),
            (FIELD_SPEC.to_owned(), self.set_spec.clone()),
            (FIELD_CREATED.to_owned(), self.created_time.clone()),
            (FIELD_INFO.to_owned(), self.info.to_string()),
            (FIELD_STATE.to_owned(), self.state.clone()),
            (FIELD_STATE_TIME.to_owned(), self.state_time.clone()),
        ])
    }

    /// Deserialize from a flat mapping. Identifier, state and state time
    /// are mandatory; the rest defaults to unset when absent or blank.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self> {
        let required = |field: &str| -> Result<String> {
            fields
                .get(field)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or_else(|| LedgerError::MissingField {
                    field: field.to_owned(),
                })
        };
        let mut record = Record::new(required(FIELD_IDENTIFIER)?);
        record.state = required(FIELD_STATE)?;
        record.state_time = required(FIELD_STATE_TIME)?;
        if let Some(value) = fields.get(FIELD_SPEC).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            record.set_spec = value.to_owned();
        }
        if let Some(value) = fields.get(FIELD_CREATED).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            record.created_time = value.to_owned();
        }
        if let Some(value) = fields.get(FIELD_INFO) {
            record.info = Info::decode(value);
        }
        Ok(record)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        if self.set_spec != UNSET {
            write!(f, "\t{}", self.set_spec)?;
        }
        if self.created_time != UNSET {
            write!(f, "\t{}", self.created_time)?;
        }
        if !self.info.is_unset() {
            write!(f, "\t{}", self.info)?;
        }
        write!(f, "\t{}\t{}", self.state, self.state_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::schema::legacy_fields;

    #[test]
    fn test_local_identifiers() {
        let cases = [
            ("oai:digital.bibliothek.uni-halle.de/hd:10595", "10595"),
            ("oai:digitale.bibliothek.uni-halle.de/vd18:9427342", "9427342"),
            ("oai:opendata.uni-halle.de:1981185920/34265", "1981185920_34265"),
            ("oai:dev.opendata.uni-halle.de:123456789/27949", "123456789_27949"),
        ];
        for (urn, expected) in cases {
            let record = Record::new(urn);
            assert_eq!(record.local_identifier(), expected);
            assert!(record.to_string().contains(urn));
        }
    }

    #[test]
    fn test_from_row_blank_optionals_stay_unset() {
        let schema = Schema::new(legacy_fields()).unwrap();
        let values: Vec<String> = ["oai:host:1", "", " ", "n.a.", "busy", "2021-08-03_15:03:56"]
            .map(str::to_owned)
            .to_vec();
        let record = Record::from_row(&schema, &values);
        assert_eq!(record.set_spec, UNSET);
        assert_eq!(record.created_time, UNSET);
        assert!(record.info.is_unset());
        assert_eq!(record.state(), "busy");
    }

    #[test]
    fn test_fields_round_trip() {
        let mut record = Record::new("oai:host:1");
        record.set_state("ocr_done");
        record.info = Info::entry("n_ocr", 5);
        let restored = Record::from_fields(&record.to_fields()).unwrap();
        assert_eq!(restored.identifier(), "oai:host:1");
        assert_eq!(restored.state(), "ocr_done");
        assert_eq!(restored.info, record.info);
    }

    #[test]
    fn test_from_fields_missing_state_rejected() {
        let fields = BTreeMap::from([(FIELD_IDENTIFIER.to_owned(), "oai:host:1".to_owned())]);
        let result = Record::from_fields(&fields);
        assert!(matches!(
            result,
            Err(LedgerError::MissingField { field }) if field == FIELD_STATE
        ));
    }
}
