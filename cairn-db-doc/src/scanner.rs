//! Streaming JSON scanner.
//!
//! Walks a canonical JSON buffer (no insignificant whitespace) one *value
//! stop* at a time while maintaining the structural location of the most
//! recent stop. Stops are the positions where a leaf chunk may legally
//! end: just inside an opened container, at the start of a member or
//! element's value, and just past a completed value.
//!
//! The scanner is deliberately not a general-purpose JSON parser: it
//! assumes the canonical form the marshaller produces, and surfaces
//! structural violations as parse errors with a byte offset.
//!
//! A scanner is cheap to clone: its state is just the buffer, an offset,
//! and the current location. That is what makes mid-buffer restarts after
//! a chunk cut and lookahead-with-rewind both trivial.

use crate::location::{JsonLocation, LocationMarker, PathStep};
use cairn_db_core::{Error, Result};

/// Outcome of one scanner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProgress {
    /// Stopped at the next location; the scanner's offset and location
    /// describe it.
    Stop,
    /// The buffer is exhausted; append more bytes or finalize.
    EndOfInput,
}

/// Byte-level streaming scanner with a structural location cursor.
#[derive(Debug, Clone)]
pub struct JsonScanner {
    buf: Vec<u8>,
    offset: usize,
    location: JsonLocation,
}

impl JsonScanner {
    /// Scanner at offset 0 of a buffer holding a document from its first
    /// byte.
    pub fn scan_from_beginning(buf: Vec<u8>) -> Self {
        Self {
            buf,
            offset: 0,
            location: JsonLocation::start_of_document(),
        }
    }

    /// Scanner at offset 0 of a buffer that begins mid-document, at the
    /// given location. Used to resume after a chunk cut and to scan a leaf
    /// seeded from its left neighbor's boundary key.
    pub fn scan_from_middle(buf: Vec<u8>, location: JsonLocation) -> Self {
        Self {
            buf,
            offset: 0,
            location,
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Offset just past the most recently completed stop.
    pub fn value_offset(&self) -> usize {
        self.offset
    }

    pub fn location(&self) -> &JsonLocation {
        &self.location
    }

    /// Whether every buffered byte has been consumed.
    pub fn at_end_of_input(&self) -> bool {
        self.offset >= self.buf.len()
    }

    /// True iff no sibling has been emitted yet in the container the
    /// scanner currently sits in, i.e. a value written here needs no
    /// preceding comma.
    pub fn first_element_or_end_of_empty_value(&self) -> bool {
        matches!(
            self.location.marker,
            LocationMarker::ObjectInitial | LocationMarker::ArrayInitial
        )
    }

    /// Append bytes to the buffer without scanning them.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Advance the offset past bytes the caller knows contain no stop,
    /// without re-scanning them.
    pub fn skip_bytes(&mut self, n: usize) {
        debug_assert!(self.offset + n <= self.buf.len());
        self.offset += n;
    }

    /// Reposition the structural cursor. The caller asserts the bytes at
    /// the current offset begin a value at exactly this location.
    pub fn set_location(&mut self, location: JsonLocation) {
        self.location = location;
    }

    /// Consume one value stop.
    ///
    /// On `Stop`, the location names the stop just reached and the offset
    /// sits just past it. Returns `EndOfInput` when the buffer is
    /// exhausted; the scanner may be resumed after appending more bytes.
    pub fn advance_to_next_location(&mut self) -> Result<ScanProgress> {
        if self.at_end_of_input() {
            return Ok(ScanProgress::EndOfInput);
        }
        match self.location.marker {
            LocationMarker::StartOfValue => self.accept_value()?,
            LocationMarker::ObjectInitial => self.accept_first_member()?,
            LocationMarker::ArrayInitial => self.accept_first_element()?,
            LocationMarker::EndOfValue => self.accept_next_sibling()?,
        }
        Ok(ScanProgress::Stop)
    }

    fn accept_value(&mut self) -> Result<()> {
        match self.buf[self.offset] {
            b'{' => {
                self.offset += 1;
                self.location.marker = LocationMarker::ObjectInitial;
            }
            b'[' => {
                self.offset += 1;
                self.location.marker = LocationMarker::ArrayInitial;
            }
            b'"' => {
                self.scan_string_body()?;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b'-' | b'0'..=b'9' => {
                self.scan_number()?;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b't' => {
                self.expect_literal(b"true")?;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b'f' => {
                self.expect_literal(b"false")?;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b'n' => {
                self.expect_literal(b"null")?;
                self.location.marker = LocationMarker::EndOfValue;
            }
            c => {
                return Err(Error::parse(
                    self.offset,
                    format!("expected a value, found 0x{c:02x}"),
                ))
            }
        }
        Ok(())
    }

    fn accept_first_member(&mut self) -> Result<()> {
        match self.buf[self.offset] {
            b'}' => {
                // Empty object: the container itself is now complete.
                self.offset += 1;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b'"' => {
                let key = self.scan_object_key()?;
                self.location.path.push(PathStep::Key(key));
                self.location.marker = LocationMarker::StartOfValue;
            }
            c => {
                return Err(Error::parse(
                    self.offset,
                    format!("expected '\"' or '}}' in object, found 0x{c:02x}"),
                ))
            }
        }
        Ok(())
    }

    fn accept_first_element(&mut self) -> Result<()> {
        if self.buf[self.offset] == b']' {
            // Empty array: the container itself is now complete.
            self.offset += 1;
            self.location.marker = LocationMarker::EndOfValue;
        } else {
            // Consumes no bytes: the stop is the start of element 0.
            self.location.path.push(PathStep::Index(0));
            self.location.marker = LocationMarker::StartOfValue;
        }
        Ok(())
    }

    fn accept_next_sibling(&mut self) -> Result<()> {
        match self.buf[self.offset] {
            b',' => {
                self.offset += 1;
                match self.location.path.last_mut() {
                    Some(PathStep::Index(i)) => {
                        *i += 1;
                        self.location.marker = LocationMarker::StartOfValue;
                    }
                    Some(PathStep::Key(_)) => {
                        let key = self.scan_object_key()?;
                        if let Some(last) = self.location.path.last_mut() {
                            *last = PathStep::Key(key);
                        }
                        self.location.marker = LocationMarker::StartOfValue;
                    }
                    None => {
                        return Err(Error::parse(
                            self.offset - 1,
                            "separator at document top level",
                        ))
                    }
                }
            }
            b'}' => {
                match self.location.path.pop() {
                    Some(PathStep::Key(_)) => {}
                    _ => {
                        return Err(Error::parse(self.offset, "'}' closing a non-object"));
                    }
                }
                self.offset += 1;
                self.location.marker = LocationMarker::EndOfValue;
            }
            b']' => {
                match self.location.path.pop() {
                    Some(PathStep::Index(_)) => {}
                    _ => {
                        return Err(Error::parse(self.offset, "']' closing a non-array"));
                    }
                }
                self.offset += 1;
                self.location.marker = LocationMarker::EndOfValue;
            }
            c => {
                return Err(Error::parse(
                    self.offset,
                    format!("expected ',', '}}' or ']', found 0x{c:02x}"),
                ))
            }
        }
        Ok(())
    }

    /// Scan `"key":`, returning the canonical key bytes (without quotes).
    fn scan_object_key(&mut self) -> Result<Vec<u8>> {
        if self.buf.get(self.offset) != Some(&b'"') {
            return Err(Error::parse(self.offset, "expected object key"));
        }
        let range = self.scan_string_body()?;
        let key = self.buf[range].to_vec();
        if self.buf.get(self.offset) != Some(&b':') {
            return Err(Error::parse(self.offset, "expected ':' after object key"));
        }
        self.offset += 1;
        Ok(key)
    }

    /// Scan a string starting at the current offset (which must be `"`),
    /// returning the range of its contents. Escapes are validated for
    /// shape, not decoded, keys are kept in canonical escaped form.
    fn scan_string_body(&mut self) -> Result<std::ops::Range<usize>> {
        let start = self.offset + 1;
        let mut i = start;
        while i < self.buf.len() {
            match self.buf[i] {
                b'\\' => {
                    match self.buf.get(i + 1) {
                        Some(b'u') => {
                            if i + 6 > self.buf.len()
                                || !self.buf[i + 2..i + 6].iter().all(u8::is_ascii_hexdigit)
                            {
                                return Err(Error::parse(i, "bad \\u escape"));
                            }
                            i += 6;
                        }
                        Some(c) if br#""\/bfnrt"#.contains(c) => i += 2,
                        Some(c) => {
                            return Err(Error::parse(i, format!("bad escape '\\{}'", *c as char)))
                        }
                        None => return Err(Error::parse(i, "unterminated escape")),
                    }
                }
                b'"' => {
                    self.offset = i + 1;
                    return Ok(start..i);
                }
                _ => i += 1,
            }
        }
        Err(Error::parse(start - 1, "unterminated string"))
    }

    /// Scan a number. The buffer either continues with a structural byte
    /// or ends here; both terminate the number.
    fn scan_number(&mut self) -> Result<()> {
        let start = self.offset;
        while self.offset < self.buf.len()
            && matches!(self.buf[self.offset], b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
        {
            self.offset += 1;
        }
        if !self.buf[start..self.offset].iter().any(u8::is_ascii_digit) {
            return Err(Error::parse(start, "number without digits"));
        }
        Ok(())
    }

    fn expect_literal(&mut self, literal: &[u8]) -> Result<()> {
        if self.buf[self.offset..].starts_with(literal) {
            self.offset += literal.len();
            Ok(())
        } else {
            Err(Error::parse(
                self.offset,
                format!(
                    "expected '{}'",
                    std::str::from_utf8(literal).expect("literals are ASCII")
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the scanner to exhaustion, collecting `(path, marker, offset)`
    /// triples at every stop.
    fn stops(json: &str) -> Vec<(String, LocationMarker, usize)> {
        let mut scanner = JsonScanner::scan_from_beginning(json.as_bytes().to_vec());
        let mut out = Vec::new();
        while scanner.advance_to_next_location().unwrap() == ScanProgress::Stop {
            out.push((
                scanner.location().path.to_string(),
                scanner.location().marker,
                scanner.value_offset(),
            ));
        }
        assert!(scanner.at_end_of_input());
        out
    }

    use crate::location::LocationMarker::{ArrayInitial, EndOfValue, ObjectInitial, StartOfValue};

    #[test]
    fn test_scalar_document() {
        assert_eq!(stops("42"), vec![("$".into(), EndOfValue, 2)]);
        assert_eq!(stops("\"hi\""), vec![("$".into(), EndOfValue, 4)]);
        assert_eq!(stops("null"), vec![("$".into(), EndOfValue, 4)]);
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(
            stops("{}"),
            vec![("$".into(), ObjectInitial, 1), ("$".into(), EndOfValue, 2)]
        );
        assert_eq!(
            stops("[]"),
            vec![("$".into(), ArrayInitial, 1), ("$".into(), EndOfValue, 2)]
        );
    }

    #[test]
    fn test_object_walk() {
        assert_eq!(
            stops(r#"{"a":1,"bb":[true]}"#),
            vec![
                ("$".into(), ObjectInitial, 1),
                ("$.a".into(), StartOfValue, 5),
                ("$.a".into(), EndOfValue, 6),
                ("$.bb".into(), StartOfValue, 12),
                ("$.bb".into(), ArrayInitial, 13),
                ("$.bb[0]".into(), StartOfValue, 13),
                ("$.bb[0]".into(), EndOfValue, 17),
                ("$.bb".into(), EndOfValue, 18),
                ("$".into(), EndOfValue, 19),
            ]
        );
    }

    #[test]
    fn test_array_indices_advance() {
        let got = stops("[10,20,30]");
        let starts: Vec<&(String, LocationMarker, usize)> = got
            .iter()
            .filter(|(_, m, _)| *m == StartOfValue)
            .collect();
        assert_eq!(
            starts.iter().map(|(p, _, _)| p.as_str()).collect::<Vec<_>>(),
            vec!["$[0]", "$[1]", "$[2]"]
        );
    }

    #[test]
    fn test_string_escapes_do_not_terminate() {
        let got = stops(r#"{"k":"a\"b\\cé"}"#);
        assert_eq!(got.last().unwrap().0, "$");
    }

    #[test]
    fn test_parse_error_carries_offset() {
        let mut scanner = JsonScanner::scan_from_beginning(b"{\"a\":!}".to_vec());
        scanner.advance_to_next_location().unwrap(); // into the object
        scanner.advance_to_next_location().unwrap(); // key, start of value
        match scanner.advance_to_next_location() {
            Err(Error::Parse { offset, .. }) => assert_eq!(offset, 5),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_close_is_an_error() {
        let mut scanner = JsonScanner::scan_from_beginning(b"[1}".to_vec());
        scanner.advance_to_next_location().unwrap();
        scanner.advance_to_next_location().unwrap();
        scanner.advance_to_next_location().unwrap();
        assert!(scanner.advance_to_next_location().is_err());
    }

    #[test]
    fn test_first_element_flag() {
        let mut scanner = JsonScanner::scan_from_beginning(b"{\"a\":1}".to_vec());
        scanner.advance_to_next_location().unwrap();
        assert!(scanner.first_element_or_end_of_empty_value());
        scanner.advance_to_next_location().unwrap();
        assert!(!scanner.first_element_or_end_of_empty_value());
    }

    #[test]
    fn test_resume_from_middle() {
        // Scan the tail of a document from a mid-document location, as the
        // chunker does after a cut.
        let full = br#"{"a":1,"b":2}"#;
        let mut scanner = JsonScanner::scan_from_beginning(full.to_vec());
        for _ in 0..3 {
            scanner.advance_to_next_location().unwrap();
        }
        // Now at end of $.a; restart a fresh scanner on the remaining bytes.
        let rest = full[scanner.value_offset()..].to_vec();
        let mut resumed = JsonScanner::scan_from_middle(rest, scanner.location().clone());
        let mut paths = Vec::new();
        while resumed.advance_to_next_location().unwrap() == ScanProgress::Stop {
            paths.push(resumed.location().path.to_string());
        }
        assert_eq!(paths, vec!["$.b", "$.b", "$"]);
    }

    #[test]
    fn test_clone_is_a_checkpoint() {
        let mut scanner = JsonScanner::scan_from_beginning(b"[1,2]".to_vec());
        scanner.advance_to_next_location().unwrap();
        let checkpoint = scanner.clone();
        scanner.advance_to_next_location().unwrap();
        assert_ne!(scanner.location(), checkpoint.location());
        let mut restored = checkpoint;
        restored.advance_to_next_location().unwrap();
        assert_eq!(scanner.location(), restored.location());
        assert_eq!(scanner.value_offset(), restored.value_offset());
    }
}
