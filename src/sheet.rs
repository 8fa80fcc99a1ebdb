//! Worksheet tables.
//!
//! A worksheet is a header row plus string rows, exactly the shape that is
//! read from and written back to the sheet store. Typed records move in and
//! out of a [`Table`] through serde, keyed by column header.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed row of a named worksheet.
///
/// `COLUMNS` lists the headers the record writes, in sheet order. Columns
/// already present in a worksheet keep their position; missing ones are
/// appended in this order.
pub trait SheetRecord: Serialize + DeserializeOwned {
    /// Name of the worksheet holding these records
    const WORKSHEET: &'static str;

    /// Column headers written by this record type
    const COLUMNS: &'static [&'static str];
}

/// Header row plus data rows of one worksheet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from a full grid (header row first), as returned by a
    /// bulk fetch. Short rows are padded, long rows truncated.
    pub fn from_grid(grid: Vec<Vec<String>>) -> Self {
        let mut iter = grid.into_iter();
        let headers = iter.next().unwrap_or_default();
        let width = headers.len();
        let rows = iter
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Table { headers, rows }
    }

    /// Header row followed by every data row, ready for a full overwrite
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.headers.clone());
        grid.extend(self.rows.iter().cloned());
        grid
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Every value of one column; empty when the column is missing
    pub fn column_values(&self, name: &str) -> Vec<&str> {
        match self.column(name) {
            Some(idx) => self
                .rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Make sure every header in `columns` exists, appending missing ones
    pub fn ensure_columns(&mut self, columns: &[&str]) {
        for col in columns {
            if self.column(col).is_none() {
                self.headers.push(col.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
            }
        }
    }

    fn row_map(&self, row: &[String]) -> Map<String, Value> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| {
                let cell = row.get(i).cloned().unwrap_or_default();
                (h.clone(), Value::String(cell))
            })
            .collect()
    }

    /// Decode every row into `T`. Rows that cannot be decoded are skipped
    /// with a warning.
    pub fn records<T: SheetRecord>(&self) -> Vec<T> {
        self.indexed_records().into_iter().map(|(_, r)| r).collect()
    }

    /// Like [`Table::records`], paired with each record's row index
    pub fn indexed_records<T: SheetRecord>(&self) -> Vec<(usize, T)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                match serde_json::from_value::<T>(Value::Object(self.row_map(row))) {
                    Ok(record) => Some((i, record)),
                    Err(e) => {
                        warn!("{}: skipping row {}: {}", T::WORKSHEET, i + 2, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Encode `record` against the header row. Cells of columns the record
    /// does not write are taken from `base`.
    fn encode_row<T: SheetRecord>(&self, record: &T, base: Option<&[String]>) -> Result<Vec<String>, serde_json::Error> {
        let map = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| match map.get(h) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) => String::new(),
                Some(other) => other.to_string(),
                None => base.and_then(|row| row.get(i)).cloned().unwrap_or_default(),
            })
            .collect())
    }

    /// Append one record as a new row
    pub fn push<T: SheetRecord>(&mut self, record: &T) -> Result<(), serde_json::Error> {
        self.ensure_columns(T::COLUMNS);
        let row = self.encode_row(record, None)?;
        self.rows.push(row);
        Ok(())
    }

    /// Rewrite row `index` from `record`, keeping cells the record does not
    /// own. Out-of-range indexes append.
    pub fn set_record<T: SheetRecord>(&mut self, index: usize, record: &T) -> Result<(), serde_json::Error> {
        self.ensure_columns(T::COLUMNS);
        let row = self.encode_row(record, self.rows.get(index).map(Vec::as_slice))?;
        if index < self.rows.len() {
            self.rows[index] = row;
        } else {
            self.rows.push(row);
        }
        Ok(())
    }

    /// Replace every data row with `records`, keeping the header order
    pub fn replace_records<T: SheetRecord>(&mut self, records: &[T]) -> Result<(), serde_json::Error> {
        self.ensure_columns(T::COLUMNS);
        let rows = records
            .iter()
            .map(|r| self.encode_row(r, None))
            .collect::<Result<Vec<_>, _>>()?;
        self.rows = rows;
        Ok(())
    }
}

/// Allocate the next `<prefix>####` id by scanning existing ids for the
/// largest numeric suffix.
///
/// ```
/// use gutap::sheet::next_id;
///
/// assert_eq!(next_id("GU", ["GU0001", "GU0009"]), "GU0010");
/// assert_eq!(next_id("GU", Vec::<&str>::new()), "GU0001");
/// ```
pub fn next_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let last = existing
        .into_iter()
        .filter_map(|id| id.trim().strip_prefix(prefix))
        .filter_map(|digits| {
            let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0);
    format!("{}{:04}", prefix, last + 1)
}

/// Serde helpers for `YYYY-MM-DD` date cells.
///
/// Empty or malformed cells read as `None` instead of failing the row.
pub mod date_cell {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        // Sheets sometimes hand back a timestamp
        let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
            .ok()
    }

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format(FORMAT).to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(parse(&raw))
    }
}

/// Append a line to a newline-delimited history cell
pub fn append_line(cell: &mut String, line: &str) {
    if !cell.trim().is_empty() {
        cell.push('\n');
    } else {
        cell.clear();
    }
    cell.push_str(line);
}
