//! Ledger schema: named field roles instead of bare list positions.
//!
//! Every ledger declares its field order in the header line. The roles are
//! positional by convention — identifier first, state second-to-last,
//! state-time last — but all access goes through [`Schema`], which validates
//! the layout once at construction.

use super::error::{LedgerError, Result};

pub const FIELD_IDENTIFIER: &str = "IDENTIFIER";
pub const FIELD_SPEC: &str = "SETSPEC";
pub const FIELD_CREATED: &str = "CREATED";
pub const FIELD_INFO: &str = "INFO";
pub const FIELD_STATE: &str = "STATE";
pub const FIELD_STATE_TIME: &str = "STATE_TIME";

/// Field order of the legacy 6-column ledger layout.
pub fn legacy_fields() -> Vec<String> {
    [
        FIELD_IDENTIFIER,
        FIELD_SPEC,
        FIELD_CREATED,
        FIELD_INFO,
        FIELD_STATE,
        FIELD_STATE_TIME,
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Field order of the compact 4-column ledger layout.
pub fn compact_fields() -> Vec<String> {
    [FIELD_IDENTIFIER, FIELD_INFO, FIELD_STATE, FIELD_STATE_TIME]
        .map(str::to_owned)
        .to_vec()
}

/// Ordered field names of one ledger, at least three of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn new(fields: Vec<String>) -> Result<Self> {
        if fields.len() < 3 {
            return Err(LedgerError::SchemaTooNarrow(fields));
        }
        Ok(Self { fields })
    }

    /// Build a schema from a raw tab-separated header line.
    pub fn from_header_line(line: &str) -> Result<Self> {
        let fields = line
            .trim()
            .split('\t')
            .map(|token| token.trim().to_owned())
            .collect();
        Self::new(fields)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn identifier_field(&self) -> &str {
        &self.fields[0]
    }

    pub fn state_field(&self) -> &str {
        &self.fields[self.state_pos()]
    }

    pub fn state_time_field(&self) -> &str {
        &self.fields[self.state_time_pos()]
    }

    /// Caller-defined fields between identifier and state.
    pub fn payload_fields(&self) -> &[String] {
        &self.fields[1..self.state_pos()]
    }

    pub fn state_pos(&self) -> usize {
        self.fields.len() - 2
    }

    pub fn state_time_pos(&self) -> usize {
        self.fields.len() - 1
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn header_line(&self) -> String {
        self.fields.join("\t")
    }
}

/// One parsed row seen through its schema, for field access by name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a Schema,
    values: &'a [String],
}

impl<'a> RowView<'a> {
    pub fn new(schema: &'a Schema, values: &'a [String]) -> Self {
        Self { schema, values }
    }

    pub fn get(&self, field: &str) -> Option<&'a str> {
        self.schema
            .position(field)
            .map(|pos| self.values[pos].as_str())
    }

    pub fn identifier(&self) -> &'a str {
        &self.values[0]
    }

    pub fn state(&self) -> &'a str {
        &self.values[self.schema.state_pos()]
    }

    pub fn state_time(&self) -> &'a str {
        &self.values[self.schema.state_time_pos()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_layout_roles() {
        let schema = Schema::new(legacy_fields()).unwrap();
        assert_eq!(schema.identifier_field(), FIELD_IDENTIFIER);
        assert_eq!(schema.state_field(), FIELD_STATE);
        assert_eq!(schema.state_time_field(), FIELD_STATE_TIME);
        assert_eq!(schema.payload_fields(), vec![FIELD_SPEC, FIELD_CREATED, FIELD_INFO]);
    }

    #[test]
    fn test_compact_layout_roles() {
        let schema = Schema::new(compact_fields()).unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.payload_fields(), vec![FIELD_INFO]);
    }

    #[test]
    fn test_too_few_fields_rejected() {
        let result = Schema::new(vec![FIELD_IDENTIFIER.into(), FIELD_STATE.into()]);
        assert!(matches!(result, Err(LedgerError::SchemaTooNarrow(_))));
    }

    #[test]
    fn test_header_line_round_trip() {
        let schema = Schema::from_header_line("IDENTIFIER\tINFO\tSTATE\tSTATE_TIME\n").unwrap();
        assert_eq!(schema.header_line(), "IDENTIFIER\tINFO\tSTATE\tSTATE_TIME");
    }

    #[test]
    fn test_row_view_by_name() {
        let schema = Schema::new(compact_fields()).unwrap();
        let values: Vec<String> = ["oai:host:1", "x", "busy", "2021-08-03_15:03:56"]
            .map(str::to_owned)
            .to_vec();
        let view = RowView::new(&schema, &values);
        assert_eq!(view.identifier(), "oai:host:1");
        assert_eq!(view.state(), "busy");
        assert_eq!(view.get(FIELD_INFO), Some("x"));
        assert_eq!(view.get("MISSING"), None);
    }
}
