//! Typed record payload with a compatibility decoder for legacy data.
//!
//! The `INFO` field is opaque to the ledger: collaborators write whatever
//! they need into it. New data is encoded as a canonical JSON object; ledgers
//! written by older tooling carry single-quoted Python-literal mappings,
//! sometimes wrapped in stray quote characters. Decoding therefore never
//! fails — anything that is not a recognizable mapping stays around as plain
//! text and gets replaced wholesale on merge.

use std::fmt;

use serde_json::{Map, Value};

use super::UNSET;

const WRAPPING_QUOTES: [char; 2] = ['"', '\''];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Info {
    #[default]
    Unset,
    Map(Map<String, Value>),
    Text(String),
}

impl Info {
    /// Decode a raw field value. JSON objects are the primary format, the
    /// legacy quoted-literal mapping is the fallback; everything else is
    /// kept verbatim as text.
    pub fn decode(raw: &str) -> Info {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == UNSET {
            return Info::Unset;
        }
        let stripped = clear_wrapping_quotes(trimmed);
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stripped) {
            return Info::Map(map);
        }
        if let Some(map) = decode_legacy(stripped) {
            return Info::Map(map);
        }
        Info::Text(trimmed.to_owned())
    }

    /// Single-entry mapping, the usual shape for service-side annotations.
    pub fn entry(key: &str, value: impl Into<Value>) -> Info {
        let mut map = Map::new();
        map.insert(key.to_owned(), value.into());
        Info::Map(map)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Info::Unset)
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Info::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Combine another payload into this one. Two mappings are shallow
    /// merged with the other side winning on key conflicts; an unset other
    /// side is a no-op; anything else replaces this payload entirely.
    pub fn merge(&mut self, other: &Info) {
        match other {
            Info::Unset => {}
            Info::Map(other_map) => match self {
                Info::Map(own_map) => {
                    for (key, value) in other_map {
                        own_map.insert(key.clone(), value.clone());
                    }
                }
                _ => *self = Info::Map(other_map.clone()),
            },
            Info::Text(_) => *self = other.clone(),
        }
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Info::Unset => f.write_str(UNSET),
            Info::Text(text) => f.write_str(text),
            Info::Map(map) => match serde_json::to_string(map) {
                Ok(encoded) => f.write_str(&encoded),
                Err(_) => f.write_str(UNSET),
            },
        }
    }
}

/// Merge two raw field values the way ledger reconciliation needs it: if
/// both sides decode to mappings the union is re-encoded (other wins on
/// conflicts), otherwise the other side replaces this one verbatim.
pub(crate) fn merge_raw(own: &str, other: &str) -> String {
    match (Info::decode(own), Info::decode(other)) {
        (Info::Map(mut own_map), Info::Map(other_map)) => {
            own_map.extend(other_map);
            Info::Map(own_map).to_string()
        }
        _ => other.to_owned(),
    }
}

/// Strip one layer of stray wrapping quote characters, each side on its own.
fn clear_wrapping_quotes(raw: &str) -> &str {
    let mut stripped = raw;
    if let Some(rest) = stripped.strip_prefix(&WRAPPING_QUOTES[..]) {
        stripped = rest;
    }
    if let Some(rest) = stripped.strip_suffix(&WRAPPING_QUOTES[..]) {
        stripped = rest;
    }
    stripped
}

/// Parse a legacy Python-literal mapping (`{'pages': 23, ...}`).
///
/// Handles nested dicts, lists, tuples, single- and double-quoted strings,
/// numbers, `True`/`False`/`None`. Returns `None` for anything else,
/// including trailing garbage after the mapping.
fn decode_legacy(raw: &str) -> Option<Map<String, Value>> {
    let mut parser = Parser::new(raw);
    parser.skip_ws();
    let value = parser.parse_value().ok()?;
    parser.skip_ws();
    if !parser.at_end() {
        return None;
    }
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_word(&mut self, word: &str) -> bool {
        let end = self.pos + word.chars().count();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().collect::<String>() == word {
            self.pos = end;
            return true;
        }
        false
    }

    fn parse_value(&mut self) -> Result<Value, ()> {
        self.skip_ws();
        let next = self.peek().ok_or(())?;
        match next {
            '{' => self.parse_dict(),
            '[' => self.parse_seq('[', ']'),
            '(' => self.parse_seq('(', ')'),
            '\'' | '"' => Ok(Value::String(self.parse_string()?)),
            _ => {
                if self.eat_word("True") {
                    return Ok(Value::Bool(true));
                }
                if self.eat_word("False") {
                    return Ok(Value::Bool(false));
                }
                if self.eat_word("None") {
                    return Ok(Value::Null);
                }
                if next.is_ascii_digit() || next == '-' || next == '+' {
                    return self.parse_number();
                }
                Err(())
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Value, ()> {
        if !self.eat('{') {
            return Err(());
        }
        let mut map = Map::new();
        self.skip_ws();
        if self.eat('}') {
            return Ok(Value::Object(map));
        }
        loop {
            let key = match self.parse_value()? {
                Value::String(key) => key,
                Value::Number(number) => number.to_string(),
                _ => return Err(()),
            };
            self.skip_ws();
            if !self.eat(':') {
                return Err(());
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.eat(',') {
                self.skip_ws();
                if self.eat('}') {
                    return Ok(Value::Object(map));
                }
                continue;
            }
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            return Err(());
        }
    }

    fn parse_seq(&mut self, open: char, close: char) -> Result<Value, ()> {
        if !self.eat(open) {
            return Err(());
        }
        let mut items = Vec::new();
        self.skip_ws();
        if self.eat(close) {
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            if self.eat(',') {
                self.skip_ws();
                if self.eat(close) {
                    return Ok(Value::Array(items));
                }
                continue;
            }
            if self.eat(close) {
                return Ok(Value::Array(items));
            }
            return Err(());
        }
    }

    fn parse_string(&mut self) -> Result<String, ()> {
        let quote = self.bump().ok_or(())?;
        let mut text = String::new();
        loop {
            let c = self.bump().ok_or(())?;
            if c == quote {
                return Ok(text);
            }
            if c == '\\' {
                let escaped = self.bump().ok_or(())?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    other => text.push(other),
                }
                continue;
            }
            text.push(c);
        }
    }

    fn parse_number(&mut self) -> Result<Value, ()> {
        let mut literal = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E' | '_') {
                literal.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal = literal.replace('_', "");
        if let Ok(int) = literal.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        let float = literal.parse::<f64>().map_err(|_| ())?;
        serde_json::Number::from_f64(float)
            .map(Value::Number)
            .ok_or(())
    }
}
