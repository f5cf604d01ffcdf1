//! Header-driven CSV column extraction.
//!
//! The caller names the columns it wants, in order, each with a parser
//! for its cell type. The header row is mapped to indices once, then
//! every following row contributes one value per requested column. Rows
//! whose cell count disagrees with the header are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Parser applied to every cell of one requested column.
pub(crate) type ColumnParser = fn(&str) -> Option<i64>;

/// Cell parser for plain integer columns.
pub(crate) fn parse_integer(cell: &str) -> Option<i64> {
    cell.trim().parse().ok()
}

/// Reads the requested columns of the CSV at `path`, in request order.
pub(crate) fn read_columns(
    path: &Path,
    columns: &[(&str, ColumnParser)],
) -> Result<Vec<Vec<i64>>> {
    let file = File::open(path).map_err(Error::InputReadFailed)?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .ok_or(Error::InvalidArgument("CSV file is empty"))?
        .map_err(Error::InputReadFailed)?;
    let names: Vec<&str> = header.trim().split(',').map(str::trim).collect();

    let mut indices = Vec::with_capacity(columns.len());
    for (name, _) in columns {
        let index = names
            .iter()
            .position(|candidate| candidate == name)
            .ok_or(Error::InvalidArgument("CSV column is missing"))?;
        indices.push(index);
    }

    let mut values = vec![Vec::new(); columns.len()];
    for (row, line) in lines.enumerate() {
        let line = line.map_err(Error::InputReadFailed)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cells: Vec<&str> = trimmed.split(',').collect();
        if cells.len() != names.len() {
            tracing::debug!(row = row + 2, "skipping CSV row with mismatched cell count");
            continue;
        }
        for (slot, ((_, parser), &index)) in columns.iter().zip(&indices).enumerate() {
            let value = parser(cells[index])
                .ok_or(Error::InvalidArgument("CSV cell could not be parsed"))?;
            values[slot].push(value);
        }
    }
    Ok(values)
}
