use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl SiteCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        SiteCoordinates {
            latitude,
            longitude,
        }
    }
}

/// Maps a site id to its coordinates. No match means no coordinate metadata.
pub trait CoordinateLookup {
    fn lookup(&self, site_id: &str) -> Option<SiteCoordinates>;
}

/// A lookup that never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCoordinates;

impl CoordinateLookup for NoCoordinates {
    fn lookup(&self, _site_id: &str) -> Option<SiteCoordinates> {
        None
    }
}

impl<F> CoordinateLookup for F
where
    F: Fn(&str) -> Option<SiteCoordinates>,
{
    fn lookup(&self, site_id: &str) -> Option<SiteCoordinates> {
        self(site_id)
    }
}

/// Site coordinates loaded from a `site_id,latitude,longitude` CSV.
///
/// A site listed on several rows is a supply area given by its boundary
/// points; its coordinate is the centroid of that polygon.
///
/// Rows that cannot be read are skipped with a warning; a site without a
/// usable row is simply absent from the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateTable {
    sites: BTreeMap<String, SiteCoordinates>,
    // lowercased id -> first stored id in sort order
    folded: BTreeMap<String, String>,
}

impl CoordinateTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(Self::parse_csv(&contents))
    }

    pub fn parse_csv(contents: &str) -> Self {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(contents.as_bytes());

        let mut points: Vec<(String, Vec<SiteCoordinates>)> = Vec::new();
        let mut skipped = 0usize;
        for (line, result) in reader.records().enumerate() {
            let parsed = match result {
                Ok(record) => parse_row(&record),
                Err(e) => {
                    log::warn!("site: unreadable coordinate row {}: {}", line + 2, e);
                    None
                }
            };
            let Some((site_id, coordinates)) = parsed else {
                log::warn!("site: skipping bad coordinate row {}", line + 2);
                skipped += 1;
                continue;
            };
            match points.iter_mut().find(|(id, _)| *id == site_id) {
                Some((_, existing)) => existing.push(coordinates),
                None => points.push((site_id, vec![coordinates])),
            }
        }

        let mut table = CoordinateTable::default();
        for (site_id, boundary) in points {
            table.insert(site_id, centroid(&boundary));
        }
        log::debug!(
            "site: loaded coordinates for {} sites, skipped {} rows",
            table.len(),
            skipped
        );
        table
    }

    pub fn insert(&mut self, site_id: impl Into<String>, coordinates: SiteCoordinates) {
        let site_id = site_id.into();
        let folded = site_id.to_lowercase();
        let keep = self
            .folded
            .get(&folded)
            .is_some_and(|existing| *existing <= site_id);
        if !keep {
            self.folded.insert(folded, site_id.clone());
        }
        self.sites.insert(site_id, coordinates);
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl CoordinateLookup for CoordinateTable {
    fn lookup(&self, site_id: &str) -> Option<SiteCoordinates> {
        if let Some(found) = self.sites.get(site_id) {
            return Some(*found);
        }
        self.folded
            .get(&site_id.to_lowercase())
            .and_then(|id| self.sites.get(id))
            .copied()
    }
}

fn parse_row(record: &StringRecord) -> Option<(String, SiteCoordinates)> {
    if record.len() < 3 {
        return None;
    }
    let site_id = record.get(0)?.to_string();
    if site_id.is_empty() {
        return None;
    }
    let latitude = record.get(1)?.parse().ok()?;
    let longitude = record.get(2)?.parse().ok()?;
    Some((site_id, SiteCoordinates::new(latitude, longitude)))
}

/// Area centroid of a polygon given by its vertices in order.
///
/// Fewer than three points, or a polygon with no area, fall back to the mean
/// of the points.
pub fn centroid(points: &[SiteCoordinates]) -> SiteCoordinates {
    let n = points.len() as f64;
    let mean = SiteCoordinates::new(
        points.iter().map(|p| p.latitude).sum::<f64>() / n,
        points.iter().map(|p| p.longitude).sum::<f64>() / n,
    );
    if points.len() < 3 {
        return mean;
    }

    // shoelace over (x = longitude, y = latitude)
    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        let cross = a.longitude * b.latitude - b.longitude * a.latitude;
        area2 += cross;
        cx += (a.longitude + b.longitude) * cross;
        cy += (a.latitude + b.latitude) * cross;
    }
    if area2.abs() < f64::EPSILON {
        return mean;
    }
    SiteCoordinates::new(cy / (3.0 * area2), cx / (3.0 * area2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_single_row_site() {
        let table = CoordinateTable::parse_csv("site_id,latitude,longitude\nbolney,50.99,-0.2\n");
        assert_eq!(table.lookup("bolney"), Some(SiteCoordinates::new(50.99, -0.2)));
        assert_eq!(table.lookup("nowhere"), None);
    }

    #[test]
    fn test_polygon_centroid() {
        // unit square with corners at (lat 0..2, lon 0..2)
        let table = CoordinateTable::parse_csv(
            "site_id,latitude,longitude\n\
             sq,0,0\n\
             sq,0,2\n\
             sq,2,2\n\
             sq,2,0\n",
        );
        let c = table.lookup("sq").unwrap();
        assert!(close(c.latitude, 1.0));
        assert!(close(c.longitude, 1.0));
    }

    #[test]
    fn test_degenerate_polygon_uses_mean() {
        let c = centroid(&[
            SiteCoordinates::new(0.0, 0.0),
            SiteCoordinates::new(1.0, 1.0),
            SiteCoordinates::new(2.0, 2.0),
        ]);
        assert!(close(c.latitude, 1.0));
        assert!(close(c.longitude, 1.0));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let table =
            CoordinateTable::parse_csv("site_id,latitude,longitude\nBolney,51.0,-0.2\n");
        assert!(table.lookup("bolney").is_some());
        assert!(table.lookup("BOLNEY").is_some());
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let table = CoordinateTable::parse_csv(
            "site_id,latitude,longitude\n\
             bolney,50.99,-0.2\n\
             ninfield,,\n\
             x,north,1\n\
             short\n",
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("bolney"), Some(SiteCoordinates::new(50.99, -0.2)));
        assert_eq!(table.lookup("ninfield"), None);
    }

    #[test]
    fn test_case_fallback_is_deterministic() {
        let mut table = CoordinateTable::default();
        table.insert("bolney", SiteCoordinates::new(3.0, 3.0));
        table.insert("Bolney", SiteCoordinates::new(2.0, 2.0));
        table.insert("BOLNEY", SiteCoordinates::new(1.0, 1.0));
        // exact matches first
        assert_eq!(table.lookup("Bolney"), Some(SiteCoordinates::new(2.0, 2.0)));
        // otherwise the first id in sort order
        assert_eq!(table.lookup("bOLNEY"), Some(SiteCoordinates::new(1.0, 1.0)));
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |site: &str| (site == "a").then(|| SiteCoordinates::new(1.0, 2.0));
        assert!(lookup.lookup("a").is_some());
        assert!(NoCoordinates.lookup("a").is_none());
    }
}
