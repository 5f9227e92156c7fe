use crate::error::PersistenceError;
use crate::models::{Dimension, LabeledArray, POWER_VARIABLE};
use gsp_core::site::SiteCoordinates;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;

/// Load a dataset file written by [`crate::writer::persist`].
pub fn read_dataset(path: &Path) -> Result<LabeledArray, PersistenceError> {
    let sqlite = |e: rusqlite::Error| PersistenceError::sqlite(path, e);
    if !path.is_file() {
        return Err(PersistenceError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such dataset file"),
        ));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(sqlite)?;

    let mut stmt = conn
        .prepare("SELECT key, value FROM attributes ORDER BY key")
        .map_err(sqlite)?;
    let attrs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .and_then(|rows| rows.collect::<Result<BTreeMap<_, _>, _>>())
        .map_err(sqlite)?;

    let mut stmt = conn
        .prepare("SELECT name, size FROM dimensions ORDER BY position")
        .map_err(sqlite)?;
    let dim_rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(sqlite)?;

    let mut dims = Vec::with_capacity(dim_rows.len());
    {
        let mut stmt = conn
            .prepare("SELECT label FROM coordinates WHERE dimension = ?1 ORDER BY idx")
            .map_err(sqlite)?;
        for (name, size) in dim_rows {
            let labels = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(sqlite)?;
            if labels.len() as i64 != size {
                return Err(PersistenceError::malformed(
                    path,
                    format!(
                        "dimension {} declares {} labels but has {}",
                        name,
                        size,
                        labels.len()
                    ),
                ));
            }
            dims.push(Dimension::new(name, labels));
        }
    }

    let mut stmt = conn
        .prepare("SELECT site_id, latitude, longitude FROM site_metadata ORDER BY site_id")
        .map_err(sqlite)?;
    let site_coordinates = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                SiteCoordinates::new(row.get(1)?, row.get(2)?),
            ))
        })
        .and_then(|rows| rows.collect::<Result<BTreeMap<_, _>, _>>())
        .map_err(sqlite)?;

    let name = conn
        .query_row("SELECT DISTINCT variable FROM data_values LIMIT 1", [], |row| {
            row.get::<_, String>(0)
        })
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(POWER_VARIABLE.to_string()),
            other => Err(other),
        })
        .map_err(sqlite)?;

    let len: usize = dims.iter().map(Dimension::size).product();
    let mut values = vec![None; len];
    {
        let mut stmt = conn
            .prepare("SELECT flat_idx, value FROM data_values WHERE variable = ?1")
            .map_err(sqlite)?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
            })
            .map_err(sqlite)?;
        for row in rows {
            let (flat_idx, value) = row.map_err(sqlite)?;
            let slot = usize::try_from(flat_idx)
                .ok()
                .and_then(|i| values.get_mut(i))
                .ok_or_else(|| {
                    PersistenceError::malformed(
                        path,
                        format!("value index {} outside an array of {}", flat_idx, len),
                    )
                })?;
            *slot = value;
        }
    }

    log::debug!(
        "reader: loaded {} ({} dims, {} values)",
        path.display(),
        dims.len(),
        len
    );
    Ok(LabeledArray {
        name,
        dims,
        values,
        attrs,
        site_coordinates,
    })
}
