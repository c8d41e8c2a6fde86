//! Brokerage flat-file export parser
//!
//! Flex exports are CSV streams interleaved with envelope control records
//! (`BOF`/`EOF` around the file, `BOA`/`EOA` around each account, `BOS`/`EOS`
//! around each section, `MSG` for notices). Parsing strips those records,
//! takes the first remaining record as the header, and turns every later
//! record into a row. A header repeated verbatim (emitted when the service
//! concatenates sub-reports) is dropped.
//!
//! The export is not consistently UTF-8; bytes that fail UTF-8 decoding are
//! read as Latin-1 instead.

use std::borrow::Cow;

use brokerlink_domain::constants::ENVELOPE_MARKERS;
use brokerlink_domain::{BrokerLinkError, Result, TabularTable};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

/// Parse an export with the standard envelope markers.
///
/// # Errors
/// `MalformedExport` when no header survives, a row's width differs from
/// the header's, or the CSV tokenizer rejects the input.
pub fn parse_envelope(raw: &[u8]) -> Result<TabularTable> {
    TabularEnvelopeParser::default().parse(raw)
}

/// Envelope-stripping CSV parser.
#[derive(Debug, Clone)]
pub struct TabularEnvelopeParser {
    markers: Vec<String>,
}

impl Default for TabularEnvelopeParser {
    fn default() -> Self {
        Self::with_markers(ENVELOPE_MARKERS)
    }
}

impl TabularEnvelopeParser {
    /// Parser that drops records containing any of `markers` as a field.
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { markers: markers.into_iter().map(Into::into).collect() }
    }

    /// Parse raw export bytes into a table.
    ///
    /// # Errors
    /// See [`parse_envelope`].
    pub fn parse(&self, raw: &[u8]) -> Result<TabularTable> {
        let text = decode(raw);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::None)
            .from_reader(text.as_bytes());

        let mut table: Option<TabularTable> = None;
        let mut envelope_records = 0usize;
        let mut repeated_headers = 0usize;

        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                BrokerLinkError::MalformedExport(format!("record {}: {e}", index + 1))
            })?;
            if is_blank(&record) {
                continue;
            }
            if self.is_envelope(&record) {
                envelope_records += 1;
                continue;
            }

            let fields: Vec<String> = record.iter().map(str::to_string).collect();
            match table.as_mut() {
                None => table = Some(TabularTable::new(fields)),
                Some(table) if table.header() == fields.as_slice() => repeated_headers += 1,
                Some(table) => table.push_row(fields)?,
            }
        }

        let table = table.ok_or_else(|| {
            BrokerLinkError::MalformedExport("no header record after envelope stripping".into())
        })?;
        debug!(
            columns = table.header().len(),
            rows = table.len(),
            envelope_records,
            repeated_headers,
            "parsed export"
        );
        Ok(table)
    }

    fn is_envelope(&self, record: &StringRecord) -> bool {
        record.iter().any(|field| {
            let field = field.trim();
            self.markers.iter().any(|marker| marker == field)
        })
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn decode(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text)),
        Err(_) => Cow::Owned(raw.iter().map(|&byte| char::from(byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(table: &TabularTable) -> Vec<Vec<&str>> {
        table.rows().iter().map(|row| row.iter().map(String::as_str).collect()).collect()
    }

    #[test]
    fn strips_envelope_records() {
        let table = parse_envelope(b"H1,H2\nBOA,x,y\n1,2\nEOA,x,y\n").unwrap();
        assert_eq!(table.header(), ["H1", "H2"]);
        assert_eq!(rows(&table), vec![vec!["1", "2"]]);
    }

    #[test]
    fn drops_repeated_header() {
        let table = parse_envelope(b"H1,H2\n1,2\nH1,H2\n3,4\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn full_flex_export() {
        let table = parse_envelope(b"BOF\nSym,Qty\nBOA\nAAPL,10\nEOA\nEOF").unwrap();
        assert_eq!(table.header(), ["Sym", "Qty"]);
        assert_eq!(table.len(), 1);

        let record = table.record(0).unwrap();
        assert_eq!(record.get("Sym"), Some("AAPL"));
        assert_eq!(record.get("Qty"), Some("10"));
    }

    #[test]
    fn every_marker_is_stripped() {
        for marker in ENVELOPE_MARKERS {
            let raw = format!("A,B\n\"{marker}\",meta\n1,2\n");
            let table = parse_envelope(raw.as_bytes()).unwrap();
            assert_eq!(table.len(), 1, "marker {marker} leaked into rows");
        }
    }

    #[test]
    fn marker_must_be_whole_field() {
        let table = parse_envelope(b"Code,Name\nBOFA,Bank of Fake America\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["BOFA", "Bank of Fake America"]]);
    }

    #[test]
    fn marker_in_later_field_drops_record() {
        let table = parse_envelope(b"A,B,C\n1,MSG,3\n4,5,6\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["4", "5", "6"]]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let raw = b"BOF,acct\nSym,Qty,Px\nBOS,Trades\nAAPL,10,1.5\nMSFT,5,2.0\nEOS\nEOF\n";
        assert_eq!(parse_envelope(raw).unwrap(), parse_envelope(raw).unwrap());
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let table = parse_envelope(b"Desc,Qty\r\n\"Apple, Inc.\",10\r\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["Apple, Inc.", "10"]]);
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1() {
        let table = parse_envelope(b"Name,City\nJos\xe9,Z\xfcrich\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["José", "Zürich"]]);
    }

    #[test]
    fn utf8_bom_is_ignored() {
        let table = parse_envelope("\u{feff}A,B\n1,2\n".as_bytes()).unwrap();
        assert_eq!(table.header(), ["A", "B"]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let table = parse_envelope(b"A,B\n\n1,2\n   \n3,4\n").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn header_only_is_empty_table() {
        let table = parse_envelope(b"BOF\nA,B\nEOF\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.header(), ["A", "B"]);
    }

    #[test]
    fn envelope_only_is_malformed() {
        let err = parse_envelope(b"BOF\nEOF\n").unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedExport(_)));

        let err = parse_envelope(b"").unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedExport(_)));
    }

    #[test]
    fn width_mismatch_is_malformed() {
        let err = parse_envelope(b"A,B\n1,2,3\n").unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedExport(msg) if msg.contains("3 field")));
    }

    #[test]
    fn custom_markers() {
        let parser = TabularEnvelopeParser::with_markers(["HDR"]);
        let table = parser.parse(b"HDR,1\nA,B\n1,2\nBOF,x\n").unwrap();
        assert_eq!(rows(&table), vec![vec!["1", "2"], vec!["BOF", "x"]]);
    }
}
