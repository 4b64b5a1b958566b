use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use gtfs_shapes_model::{Route, Shape, Stop, StopTime, Trip};

pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const SHAPES_FILE: &str = "shapes.txt";

/// Rows of one GTFS file with the CSV line each row came from (header = 1).
#[derive(Debug, Clone, Default)]
pub struct CsvTable<T> {
    pub headers: Vec<String>,
    pub rows: Vec<T>,
    pub row_numbers: Vec<u64>,
}

impl<T> CsvTable<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        let row_numbers = (0..rows.len() as u64).map(|index| index + 2).collect();
        Self {
            headers: Vec::new(),
            rows,
            row_numbers,
        }
    }

    pub fn row_number(&self, index: usize) -> u64 {
        self.row_numbers
            .get(index)
            .copied()
            .unwrap_or(index as u64 + 2)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(csv row number, row)` pairs in file order.
    pub fn iter_with_rows(&self) -> impl Iterator<Item = (u64, &T)> {
        self.rows
            .iter()
            .enumerate()
            .map(move |(index, row)| (self.row_number(index), row))
    }
}

#[derive(Debug, Error)]
pub enum FeedLoadError {
    #[error("missing required GTFS file {0}")]
    MissingFile(&'static str),
    #[error("failed to read {file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    pub stops: CsvTable<Stop>,
    pub routes: CsvTable<Route>,
    pub trips: CsvTable<Trip>,
    pub stop_times: CsvTable<StopTime>,
    pub shapes: Option<CsvTable<Shape>>,
}

impl GtfsFeed {
    /// Loads the tables consumed by shape matching from an extracted feed.
    ///
    /// Rows that do not deserialize are logged and skipped; row-level checks
    /// belong to other validators.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, FeedLoadError> {
        let dir = dir.as_ref();
        let stops = read_required(dir, STOPS_FILE)?;
        let routes = read_required(dir, ROUTES_FILE)?;
        let trips = read_required(dir, TRIPS_FILE)?;
        let stop_times = read_required(dir, STOP_TIMES_FILE)?;
        let shapes = read_optional(dir, SHAPES_FILE)?;

        Ok(Self {
            stops,
            routes,
            trips,
            stop_times,
            shapes,
        })
    }
}

fn read_required<T: DeserializeOwned>(
    dir: &Path,
    file: &'static str,
) -> Result<CsvTable<T>, FeedLoadError> {
    read_optional(dir, file)?.ok_or(FeedLoadError::MissingFile(file))
}

fn read_optional<T: DeserializeOwned>(
    dir: &Path,
    file: &'static str,
) -> Result<Option<CsvTable<T>>, FeedLoadError> {
    let path: PathBuf = dir.join(file);
    if !path.is_file() {
        return Ok(None);
    }
    let csv_error = |source| FeedLoadError::Csv { file, source };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(&path)
        .map_err(csv_error)?;
    let header_record = reader.headers().map_err(csv_error)?.clone();
    let headers = header_record.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row_number = record
            .position()
            .map(|position| position.line())
            .unwrap_or(rows.len() as u64 + 2);
        match record.deserialize::<T>(Some(&header_record)) {
            Ok(row) => {
                rows.push(row);
                row_numbers.push(row_number);
            }
            Err(error) => {
                skipped += 1;
                warn!(file, row = row_number, %error, "skipping unparseable row");
            }
        }
    }
    debug!(file, rows = rows.len(), skipped, "loaded table");

    Ok(Some(CsvTable {
        headers,
        rows,
        row_numbers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("gtfs_shapes_{name}_{nanos}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_minimal_feed(dir: &Path) {
        fs::write(
            dir.join(STOPS_FILE),
            "stop_id,stop_name,stop_lat,stop_lon,parent_station\n\
             S1, First ,10.0,20.0,\n\
             S2,Second,,,STATION\n",
        )
        .unwrap();
        fs::write(dir.join(ROUTES_FILE), "route_id,route_type\nR1,3\n").unwrap();
        fs::write(
            dir.join(TRIPS_FILE),
            "route_id,service_id,trip_id,shape_id\nR1,SVC,T1,SH1\n",
        )
        .unwrap();
        fs::write(
            dir.join(STOP_TIMES_FILE),
            "trip_id,stop_id,stop_sequence,shape_dist_traveled\n\
             T1,S1,1,\n\
             T1,S2,not-a-number,\n\
             T1,S2,2,12.5\n",
        )
        .unwrap();
    }

    #[test]
    fn loads_tables_with_row_numbers() {
        let dir = temp_dir("load");
        write_minimal_feed(&dir);

        let feed = GtfsFeed::from_directory(&dir).unwrap();
        assert_eq!(feed.stops.len(), 2);
        assert_eq!(feed.stops.rows[0].stop_name.as_deref(), Some("First"));
        assert_eq!(feed.stops.rows[1].stop_lat, None);
        assert_eq!(
            feed.stops.rows[1].parent_station.as_deref(),
            Some("STATION")
        );
        assert!(feed.shapes.is_none());

        // The unparseable stop time on line 3 is skipped.
        assert_eq!(feed.stop_times.len(), 2);
        assert_eq!(feed.stop_times.row_numbers, vec![2, 4]);
        assert_eq!(feed.stop_times.rows[1].shape_dist_traveled, Some(12.5));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn reports_missing_required_file() {
        let dir = temp_dir("missing");
        write_minimal_feed(&dir);
        fs::remove_file(dir.join(TRIPS_FILE)).unwrap();

        let error = GtfsFeed::from_directory(&dir).unwrap_err();
        assert!(matches!(error, FeedLoadError::MissingFile(TRIPS_FILE)));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn falls_back_to_index_based_row_numbers() {
        let table = CsvTable::from_rows(vec!["a", "b"]);
        assert_eq!(table.row_number(1), 3);
        assert_eq!(table.row_number(5), 7);
        let pairs: Vec<(u64, &&str)> = table.iter_with_rows().collect();
        assert_eq!(pairs, vec![(2, &"a"), (3, &"b")]);
    }
}
