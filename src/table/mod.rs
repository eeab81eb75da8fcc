//! Tabular records consumed and produced by the crawler
//!
//! The input is a CSV file with an `address` column; the output repeats every input
//! column and appends `lat_address` and `lon_address`. Unresolved rows get empty cells.

use crate::GeoError;
use csv::StringRecord;
use std::path::Path;

/// Name of the required input column
pub const ADDRESS_COLUMN: &str = "address";

/// Output column holding the latitude
pub const LATITUDE_COLUMN: &str = "lat_address";

/// Output column holding the longitude
pub const LONGITUDE_COLUMN: &str = "lon_address";

/// One input address and its ordinal position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub index: usize,
    pub text: String,
}

impl AddressRecord {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Numbers a plain list of addresses in order
    pub fn from_texts<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Self::new(index, text))
            .collect()
    }
}

/// Coordinates recorded for one address; both fields are set together or not at all
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResultSlot {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ResultSlot {
    pub fn resolved(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    pub fn is_set(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// An address joined with its result slot
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRow {
    pub record: AddressRecord,
    pub slot: ResultSlot,
}

/// Input table read from CSV, kept whole so extra columns survive to the output
#[derive(Debug, Clone)]
pub struct InputTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    address_column: usize,
}

impl InputTable {
    /// Reads a CSV file with a header row
    ///
    /// # Returns
    ///
    /// * `Ok(InputTable)` - File read and `address` column located
    /// * `Err(GeoError)` - File unreadable, malformed, or missing the column
    pub fn read(path: &Path) -> Result<Self, GeoError> {
        let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        Self::from_reader(reader)
    }

    /// Reads CSV from any reader; used for in-memory input
    pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, GeoError> {
        let headers = reader.headers()?.clone();
        let address_column = headers
            .iter()
            .position(|h| h.trim() == ADDRESS_COLUMN)
            .ok_or_else(|| GeoError::MissingColumn(ADDRESS_COLUMN.to_string()))?;

        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers,
            rows,
            address_column,
        })
    }

    /// Address records in file order; short rows yield an empty address
    pub fn addresses(&self) -> Vec<AddressRecord> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                AddressRecord::new(index, row.get(self.address_column).unwrap_or_default())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the input columns plus latitude/longitude to `path`
    ///
    /// `results` is matched to input rows by [`AddressRecord::index`].
    pub fn write_geocoded(&self, path: &Path, results: &[GeocodeRow]) -> Result<(), GeoError> {
        let writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        self.write_geocoded_to(writer, results)
    }

    /// Same as [`InputTable::write_geocoded`] for any writer
    pub fn write_geocoded_to<W: std::io::Write>(
        &self,
        mut writer: csv::Writer<W>,
        results: &[GeocodeRow],
    ) -> Result<(), GeoError> {
        let mut header = self.headers.clone();
        header.push_field(LATITUDE_COLUMN);
        header.push_field(LONGITUDE_COLUMN);
        writer.write_record(&header)?;

        let mut slots = vec![ResultSlot::default(); self.rows.len()];
        for row in results {
            if let Some(slot) = slots.get_mut(row.record.index) {
                *slot = row.slot;
            }
        }

        for (row, slot) in self.rows.iter().zip(&slots) {
            let mut out = row.clone();
            // Pad short rows so the coordinate columns line up
            while out.len() < self.headers.len() {
                out.push_field("");
            }
            out.push_field(&format_coordinate(slot.latitude));
            out.push_field(&format_coordinate(slot.longitude));
            writer.write_record(&out)?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn format_coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
