//! Parsed report output

use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::errors::{BrokerLinkError, Result};

/// An ordered table: one header row and any number of data rows.
///
/// Every data row has exactly as many fields as the header; [`push_row`]
/// refuses anything else, so the invariant holds for every constructed table.
///
/// [`push_row`]: TabularTable::push_row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularTable {
    header: Arc<[String]>,
    rows: Vec<Vec<String>>,
}

impl TabularTable {
    /// Create an empty table with the given column names.
    #[must_use]
    pub fn new(header: Vec<String>) -> Self {
        Self { header: header.into(), rows: Vec::new() }
    }

    /// Append a data row.
    ///
    /// # Errors
    /// `MalformedExport` if the field count differs from the header's.
    pub fn push_row(&mut self, values: Vec<String>) -> Result<()> {
        if values.len() != self.header.len() {
            return Err(BrokerLinkError::MalformedExport(format!(
                "row {} has {} field(s), header has {}",
                self.rows.len() + 1,
                values.len(),
                self.header.len()
            )));
        }
        self.rows.push(values);
        Ok(())
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data row `index` as a column-keyed record.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<TableRecord<'_>> {
        self.rows.get(index).map(|values| TableRecord { header: &self.header, values })
    }

    /// All data rows in input order.
    pub fn records(&self) -> impl ExactSizeIterator<Item = TableRecord<'_>> + '_ {
        self.rows.iter().map(|values| TableRecord { header: &self.header, values })
    }

    /// Raw row values in input order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// A borrowed view of one data row keyed by column name.
#[derive(Debug, Clone, Copy)]
pub struct TableRecord<'a> {
    header: &'a [String],
    values: &'a [String],
}

impl<'a> TableRecord<'a> {
    /// Value of `column`, or `None` if the table has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.header
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.header.iter().map(String::as_str).zip(self.values.iter().map(String::as_str))
    }

    #[must_use]
    pub const fn values(&self) -> &'a [String] {
        self.values
    }
}

impl Serialize for TableRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Records<'a>(&'a TabularTable);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.records())
    }
}

impl Serialize for TabularTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut table = serializer.serialize_struct("TabularTable", 2)?;
        table.serialize_field("header", &*self.header)?;
        table.serialize_field("rows", &Records(self))?;
        table.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn rows_are_keyed_by_header() {
        let mut table = TabularTable::new(strings(&["Sym", "Qty"]));
        table.push_row(strings(&["AAPL", "10"])).unwrap();

        let record = table.record(0).unwrap();
        assert_eq!(record.get("Sym"), Some("AAPL"));
        assert_eq!(record.get("Qty"), Some("10"));
        assert_eq!(record.get("Px"), None);
        assert_eq!(record.iter().collect::<Vec<_>>(), vec![("Sym", "AAPL"), ("Qty", "10")]);
    }

    #[test]
    fn rejects_rows_with_wrong_width() {
        let mut table = TabularTable::new(strings(&["A", "B"]));
        let err = table.push_row(strings(&["1"])).unwrap_err();
        assert!(matches!(err, BrokerLinkError::MalformedExport(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn header_only_table_is_empty() {
        let table = TabularTable::new(strings(&["A"]));
        assert!(table.is_empty());
        assert_eq!(table.records().len(), 0);
    }

    #[test]
    fn serializes_rows_as_ordered_maps() {
        let mut table = TabularTable::new(strings(&["Sym", "Qty"]));
        table.push_row(strings(&["AAPL", "10"])).unwrap();

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"header":["Sym","Qty"],"rows":[{"Sym":"AAPL","Qty":"10"}]}"#);
    }
}
