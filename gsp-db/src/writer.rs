//! Write-once persistence of labeled arrays.
//!
//! The array is written to a hidden sibling file first and then hard-linked
//! onto the destination. Linking fails if the destination exists, so the
//! existence check and the write are one atomic step.

use crate::error::PersistenceError;
use crate::models::{LabeledArray, PersistOutcome};
use crate::schema::create_schema;
use rusqlite::{params, Connection};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// distinguishes staging files of concurrent writers in one process
static STAGING_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Persist `array` at `dest` unless something is already there.
pub fn persist(array: &LabeledArray, dest: &Path) -> Result<PersistOutcome, PersistenceError> {
    if fs::symlink_metadata(dest).is_ok() {
        log::info!("writer: {} exists, leaving it untouched", dest.display());
        return Ok(PersistOutcome::Skipped);
    }

    let staging = staging_path(dest);
    let written = write_array(array, &staging).and_then(|()| {
        match fs::hard_link(&staging, dest) {
            Ok(()) => Ok(PersistOutcome::Written),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PersistOutcome::Skipped),
            Err(e) => Err(PersistenceError::io(dest, e)),
        }
    });
    if let Err(e) = fs::remove_file(&staging) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("writer: could not remove {}: {}", staging.display(), e);
        }
    }

    match &written {
        Ok(PersistOutcome::Written) => log::info!(
            "writer: wrote {} ({} values)",
            dest.display(),
            array.values.len()
        ),
        Ok(PersistOutcome::Skipped) => log::info!(
            "writer: {} appeared during the write, leaving it untouched",
            dest.display()
        ),
        Err(e) => log::warn!("writer: {}", e),
    }
    written
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(
        ".{}.{}-{}-{}.tmp",
        name,
        std::process::id(),
        seq,
        nanos
    ))
}

/// Write `array` into a fresh SQLite file at `path`.
pub fn write_array(array: &LabeledArray, path: &Path) -> Result<(), PersistenceError> {
    let sqlite = |e: rusqlite::Error| PersistenceError::sqlite(path, e);

    let mut conn = Connection::open(path).map_err(sqlite)?;
    conn.execute_batch(create_schema()).map_err(sqlite)?;

    let tx = conn.transaction().map_err(sqlite)?;
    {
        let mut stmt = tx
            .prepare("INSERT INTO attributes (key, value) VALUES (?1, ?2)")
            .map_err(sqlite)?;
        for (key, value) in &array.attrs {
            stmt.execute(params![key, value]).map_err(sqlite)?;
        }

        let mut dim_stmt = tx
            .prepare("INSERT INTO dimensions (position, name, size) VALUES (?1, ?2, ?3)")
            .map_err(sqlite)?;
        let mut coord_stmt = tx
            .prepare("INSERT INTO coordinates (dimension, idx, label) VALUES (?1, ?2, ?3)")
            .map_err(sqlite)?;
        for (position, dim) in array.dims.iter().enumerate() {
            dim_stmt
                .execute(params![position as i64, dim.name, dim.size() as i64])
                .map_err(sqlite)?;
            for (idx, label) in dim.labels.iter().enumerate() {
                coord_stmt
                    .execute(params![dim.name, idx as i64, label])
                    .map_err(sqlite)?;
            }
        }

        let mut site_stmt = tx
            .prepare("INSERT INTO site_metadata (site_id, latitude, longitude) VALUES (?1, ?2, ?3)")
            .map_err(sqlite)?;
        for (site_id, coordinates) in &array.site_coordinates {
            site_stmt
                .execute(params![site_id, coordinates.latitude, coordinates.longitude])
                .map_err(sqlite)?;
        }

        let mut value_stmt = tx
            .prepare("INSERT INTO data_values (variable, flat_idx, value) VALUES (?1, ?2, ?3)")
            .map_err(sqlite)?;
        for (flat_idx, value) in array.values.iter().enumerate() {
            value_stmt
                .execute(params![array.name, flat_idx as i64, value])
                .map_err(sqlite)?;
        }
    }
    tx.commit().map_err(sqlite)?;
    conn.close().map_err(|(_, e)| sqlite(e))?;

    log::debug!(
        "writer: staged {} dims, {} values at {}",
        array.dims.len(),
        array.values.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dimension, POWER_VARIABLE};
    use crate::reader::read_dataset;
    use std::collections::BTreeMap;
    use std::sync::Barrier;

    fn array(tag: usize) -> LabeledArray {
        LabeledArray {
            name: POWER_VARIABLE.to_string(),
            dims: vec![Dimension::new("time_local", vec!["2021-10-31T00:00:00".into()])],
            values: vec![Some(tag as f64)],
            attrs: BTreeMap::from([("writer".to_string(), tag.to_string())]),
            site_coordinates: BTreeMap::new(),
        }
    }

    #[test]
    fn concurrent_persist_writes_exactly_once() {
        const WRITERS: usize = 8;
        let dir = std::env::temp_dir().join(format!("gsp-db-race-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("gsp.sqlite");
        let barrier = Barrier::new(WRITERS);

        let outcomes: Vec<(usize, PersistOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|tag| {
                    let (dest, barrier) = (&dest, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        (tag, persist(&array(tag), dest).unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<usize> = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == PersistOutcome::Written)
            .map(|(tag, _)| *tag)
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|(_, outcome)| *outcome == PersistOutcome::Skipped)
                .count(),
            WRITERS - 1
        );
        assert_eq!(read_dataset(&dest).unwrap(), array(winners[0]));

        // only the destination remains, no staging files
        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["gsp.sqlite".to_string()]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn staging_path_is_hidden_sibling() {
        let staging = staging_path(Path::new("/data/out/gsp.sqlite"));
        assert_eq!(staging.parent(), Some(Path::new("/data/out")));
        let name = staging.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".gsp.sqlite."));
        assert!(name.ends_with(".tmp"));
        assert_ne!(staging_path(Path::new("/data/out/gsp.sqlite")), staging);
    }
}
