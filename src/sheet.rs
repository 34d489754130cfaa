//! Rows of typed cells addressed by 1-based position, loaded from CSV exports
//! of the source workbook.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{Error, Result};

/// A trimmed cell. Numeric cells keep their source text, so codes like
/// `007` read back unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Number { value: Decimal, raw: String },
    Text(String),
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            Cell::Empty
        } else if let Some(value) = Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .ok()
        {
            Cell::Number {
                value,
                raw: raw.to_string(),
            }
        } else {
            Cell::Text(raw.to_string())
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number { raw, .. } | Cell::Text(raw) => Some(raw.clone()),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Number { value, .. } => Some(*value),
            _ => None,
        }
    }
}

static EMPTY: Cell = Cell::Empty;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetRow {
    number: usize,
    cells: Vec<Cell>,
}

impl SheetRow {
    pub fn new(number: usize, cells: Vec<Cell>) -> Self {
        Self { number, cells }
    }

    /// 1-based row number within the sheet, header included.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn cell(&self, column: usize) -> &Cell {
        column
            .checked_sub(1)
            .and_then(|idx| self.cells.get(idx))
            .unwrap_or(&EMPTY)
    }

    pub fn text(&self, column: usize) -> Option<String> {
        self.cell(column).as_text()
    }

    pub fn decimal(&self, column: usize) -> Option<Decimal> {
        self.cell(column).as_decimal()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sheet {
    rows: Vec<SheetRow>,
}

impl Sheet {
    pub fn new(rows: Vec<SheetRow>) -> Self {
        Self { rows }
    }

    /// Builds a sheet from raw rows; the first one is the header.
    pub fn from_rows<I, R, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                SheetRow::new(
                    idx + 1,
                    row.into_iter().map(|c| Cell::parse(c.as_ref())).collect(),
                )
            })
            .collect();
        Self { rows }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            rows.push(SheetRow::new(
                idx + 1,
                record.iter().map(Cell::parse).collect(),
            ));
        }
        Ok(Self { rows })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::unavailable(format!("data file {}", path.display()), e))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }

    /// Every row after the header.
    pub fn data_rows(&self) -> &[SheetRow] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_cells() {
        assert_eq!(Cell::parse("  "), Cell::Empty);
        assert_eq!(Cell::parse(" 35.6897").as_decimal(), Some(Decimal::new(356897, 4)));
        assert_eq!(Cell::parse("-0.5").as_decimal(), Some(Decimal::new(-5, 1)));
        assert_eq!(Cell::parse("Tokyo"), Cell::Text("Tokyo".into()));
        assert_eq!(Cell::parse("Tokyo").as_decimal(), None);
    }

    #[test]
    fn numeric_cells_keep_their_text() {
        for (raw, value) in [
            ("007", Decimal::from(7)),
            ("+1", Decimal::from(1)),
            ("1e3", Decimal::from(1000)),
            ("35.68970", Decimal::new(3568970, 5)),
        ] {
            let cell = Cell::parse(raw);
            assert_eq!(cell.as_text().as_deref(), Some(raw));
            assert_eq!(cell.as_decimal(), Some(value), "{raw}");
        }
    }

    #[test]
    fn reads_csv_with_header_and_ragged_rows() {
        let data = "city,city_ascii,lat,lng,country,iso2,iso3\n\
                    Tokyo,Tokyo,35.6897,139.6922,Japan,JP,JPN\n\
                    \"Washington, D.C.\",Washington,38.9047,-77.0163,United States\n";
        let sheet = Sheet::from_reader(data.as_bytes()).unwrap();
        assert_eq!(sheet.rows().len(), 3);
        let rows = sheet.data_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number(), 2);
        assert_eq!(rows[0].text(5).as_deref(), Some("Japan"));
        assert_eq!(rows[0].decimal(4), Some(Decimal::new(1396922, 4)));
        assert_eq!(rows[1].text(1).as_deref(), Some("Washington, D.C."));
        assert_eq!(rows[1].text(7), None);
        assert_eq!(rows[1].cell(0), &Cell::Empty);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = Sheet::from_csv_path(Path::new("/nonexistent/worldcities.csv")).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[test]
    fn header_only_sheet_has_no_data_rows() {
        let sheet = Sheet::from_rows([["city", "lat"]]);
        assert!(sheet.data_rows().is_empty());
        assert!(Sheet::default().data_rows().is_empty());
    }
}
