//! Turning warehouse rows into validated tract records.

use lending_atlas_analytics_models::{RecordError, SubAreaRecord};
use lending_atlas_database_models::Row;
use lending_atlas_geography_models::{AreaId, IdentifierError, TractId};
use lending_atlas_query::shapes::tract_columns as col;

/// Why a warehouse row was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    /// A required column was missing or null.
    #[error("missing column {0}")]
    Missing(&'static str),

    /// A column held a value outside its domain.
    #[error("column {column} is out of range: {value}")]
    OutOfRange {
        /// The column.
        column: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// An identifier column did not parse.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// The tract does not lie in the row's county.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// One `TractActivity` row, as a pair of records sharing the same activity.
#[derive(Debug, Clone, PartialEq)]
pub struct TractRecords {
    /// Record carrying the tract minority percentage.
    pub minority: SubAreaRecord,
    /// Record carrying the tract income-to-AMI ratio.
    pub income: SubAreaRecord,
}

impl TractRecords {
    /// Parses a row produced by the `TractActivity` shape.
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if identifiers are missing or malformed, counts
    /// are negative, or the tract lies outside its county.
    pub fn from_row(row: &Row) -> Result<Self, RowError> {
        let tract = TractId::parse(row.text(col::TRACT).ok_or(RowError::Missing(col::TRACT))?)?;
        let area = AreaId::parse(row.text(col::AREA).ok_or(RowError::Missing(col::AREA))?)?;

        let year = row.int(col::YEAR).ok_or(RowError::Missing(col::YEAR))?;
        let year = u16::try_from(year).map_err(|_| RowError::OutOfRange {
            column: col::YEAR,
            value: year,
        })?;

        let count = row.int(col::COUNT).unwrap_or(0);
        let count = u64::try_from(count).map_err(|_| RowError::OutOfRange {
            column: col::COUNT,
            value: count,
        })?;
        let amount = row.real(col::AMOUNT).unwrap_or(0.0);

        let minority = SubAreaRecord::new(
            tract.clone(),
            area.clone(),
            year,
            row.real(col::MINORITY_PCT),
            count,
            amount,
        )?;
        let income = SubAreaRecord::new(
            tract,
            area,
            year,
            row.real(col::INCOME_RATIO),
            count,
            amount,
        )?;

        Ok(Self { minority, income })
    }
}

/// Parses every row, dropping and counting the malformed ones.
pub fn parse_rows(rows: &[Row]) -> (Vec<TractRecords>, u64) {
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for row in rows {
        match TractRecords::from_row(row) {
            Ok(r) => records.push(r),
            Err(e) => {
                log::warn!("Dropping warehouse row: {e}");
                dropped += 1;
            }
        }
    }

    (records, dropped)
}
