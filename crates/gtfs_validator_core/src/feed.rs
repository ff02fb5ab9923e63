//! Feed accessors: a GTFS feed seen as a set of named tables.
//!
//! Every accessor hands out fresh, independently positioned streams, so any
//! number of validators can read the same table at the same time.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;
use zip::ZipArchive;

use crate::table::TableStream;

pub const AGENCY_FILE: &str = "agency.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const CALENDAR_FILE: &str = "calendar.txt";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates.txt";
pub const FARE_ATTRIBUTES_FILE: &str = "fare_attributes.txt";
pub const FARE_RULES_FILE: &str = "fare_rules.txt";
pub const FARE_MEDIA_FILE: &str = "fare_media.txt";
pub const FARE_PRODUCTS_FILE: &str = "fare_products.txt";
pub const FARE_LEG_RULES_FILE: &str = "fare_leg_rules.txt";
pub const FARE_TRANSFER_RULES_FILE: &str = "fare_transfer_rules.txt";
pub const FARE_LEG_JOIN_RULES_FILE: &str = "fare_leg_join_rules.txt";
pub const AREAS_FILE: &str = "areas.txt";
pub const STOP_AREAS_FILE: &str = "stop_areas.txt";
pub const TIMEFRAMES_FILE: &str = "timeframes.txt";
pub const RIDER_CATEGORIES_FILE: &str = "rider_categories.txt";
pub const SHAPES_FILE: &str = "shapes.txt";
pub const FREQUENCIES_FILE: &str = "frequencies.txt";
pub const TRANSFERS_FILE: &str = "transfers.txt";
pub const LOCATION_GROUPS_FILE: &str = "location_groups.txt";
pub const LOCATION_GROUP_STOPS_FILE: &str = "location_group_stops.txt";
pub const LOCATIONS_GEOJSON_FILE: &str = "locations.geojson";
pub const BOOKING_RULES_FILE: &str = "booking_rules.txt";
pub const NETWORKS_FILE: &str = "networks.txt";
pub const ROUTE_NETWORKS_FILE: &str = "route_networks.txt";
pub const FEED_INFO_FILE: &str = "feed_info.txt";
pub const ATTRIBUTIONS_FILE: &str = "attributions.txt";
pub const LEVELS_FILE: &str = "levels.txt";
pub const PATHWAYS_FILE: &str = "pathways.txt";
pub const TRANSLATIONS_FILE: &str = "translations.txt";

pub const GTFS_FILE_NAMES: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
    CALENDAR_FILE,
    CALENDAR_DATES_FILE,
    FARE_ATTRIBUTES_FILE,
    FARE_RULES_FILE,
    FARE_MEDIA_FILE,
    FARE_PRODUCTS_FILE,
    FARE_LEG_RULES_FILE,
    FARE_TRANSFER_RULES_FILE,
    FARE_LEG_JOIN_RULES_FILE,
    AREAS_FILE,
    STOP_AREAS_FILE,
    TIMEFRAMES_FILE,
    RIDER_CATEGORIES_FILE,
    SHAPES_FILE,
    FREQUENCIES_FILE,
    TRANSFERS_FILE,
    LOCATION_GROUPS_FILE,
    LOCATION_GROUP_STOPS_FILE,
    LOCATIONS_GEOJSON_FILE,
    BOOKING_RULES_FILE,
    NETWORKS_FILE,
    ROUTE_NETWORKS_FILE,
    FEED_INFO_FILE,
    ATTRIBUTIONS_FILE,
    LEVELS_FILE,
    PATHWAYS_FILE,
    TRANSLATIONS_FILE,
];

/// Tables every feed must contain.
pub const REQUIRED_FILES: &[&str] = &[AGENCY_FILE, ROUTES_FILE, TRIPS_FILE, STOP_TIMES_FILE];

/// Tables a feed should contain.
pub const RECOMMENDED_FILES: &[&str] = &[FEED_INFO_FILE];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_PIPE_CHUNK_BYTES: usize = 64 * 1024;
const ZIP_PIPE_DEPTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("input path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("input is neither a zip archive nor a directory: {0}")]
    InvalidInput(String),
    #[error("table not found: {0}")]
    NotFound(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error on {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Read-only view of a feed as named tables.
pub trait FeedAccessor: Send + Sync {
    /// Human readable description of where the feed comes from.
    fn source_label(&self) -> String;

    /// Table names, sorted.
    fn list_tables(&self) -> Result<Vec<String>, FeedError>;

    fn has_table(&self, name: &str) -> bool;

    /// Opens a fresh stream positioned at the start of `name`.
    fn open_table(&self, name: &str) -> Result<TableStream, FeedError>;
}

/// Where a feed comes from.
#[derive(Debug, Clone)]
pub enum FeedSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl FeedSource {
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, FeedError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|source| FeedError::Io {
                path: PathBuf::from("<stream>"),
                source,
            })?;
        Ok(FeedSource::Bytes(bytes))
    }

    pub fn open(self) -> Result<Box<dyn FeedAccessor>, FeedError> {
        match self {
            FeedSource::Path(path) => open_feed(path),
            FeedSource::Bytes(bytes) => {
                if !bytes.starts_with(ZIP_MAGIC) {
                    return Err(FeedError::InvalidInput(
                        "in-memory feed is not a zip archive".to_string(),
                    ));
                }
                Ok(Box::new(MemoryFeed::from_zip_bytes(bytes)?))
            }
        }
    }
}

/// Opens a directory or zip archive at `path`.
pub fn open_feed(path: impl AsRef<Path>) -> Result<Box<dyn FeedAccessor>, FeedError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FeedError::MissingPath(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Box::new(DirectoryFeed::open(path)?));
    }
    if path.is_file() {
        return Ok(Box::new(ZipFeed::open(path)?));
    }
    Err(FeedError::InvalidInput(path.display().to_string()))
}

/// Tables stored as files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryFeed {
    root: PathBuf,
    tables: Vec<String>,
}

impl DirectoryFeed {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FeedError> {
        let root = root.into();
        let entries = fs::read_dir(&root).map_err(|source| FeedError::Io {
            path: root.clone(),
            source,
        })?;
        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| FeedError::Io {
                path: root.clone(),
                source,
            })?;
            let is_file = entry
                .file_type()
                .map(|file_type| file_type.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                tables.push(name.to_string());
            }
        }
        tables.sort();
        debug!(root = %root.display(), tables = tables.len(), "opened directory feed");
        Ok(Self { root, tables })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FeedAccessor for DirectoryFeed {
    fn source_label(&self) -> String {
        self.root.display().to_string()
    }

    fn list_tables(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.tables.clone())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table == name)
    }

    fn open_table(&self, name: &str) -> Result<TableStream, FeedError> {
        if !self.has_table(name) {
            return Err(FeedError::NotFound(name.to_string()));
        }
        let path = self.root.join(name);
        let file = File::open(&path).map_err(|source| FeedError::Io { path, source })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Tables stored as top-level entries of a zip archive.
///
/// Each open re-reads the central directory and inflates the entry on a
/// helper thread, handing chunks over a bounded channel.
#[derive(Debug, Clone)]
pub struct ZipFeed {
    path: PathBuf,
    tables: Vec<String>,
}

impl ZipFeed {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FeedError> {
        let path = path.into();
        let file = File::open(&path).map_err(|source| FeedError::Io {
            path: path.clone(),
            source,
        })?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|source| FeedError::Zip {
            path: path.clone(),
            source,
        })?;
        let mut tables: Vec<String> = archive
            .file_names()
            .filter(|name| is_top_level_entry(name))
            .map(str::to_string)
            .collect();
        tables.sort();
        debug!(path = %path.display(), tables = tables.len(), "opened zip feed");
        Ok(Self { path, tables })
    }
}

impl FeedAccessor for ZipFeed {
    fn source_label(&self) -> String {
        self.path.display().to_string()
    }

    fn list_tables(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.tables.clone())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table == name)
    }

    fn open_table(&self, name: &str) -> Result<TableStream, FeedError> {
        if !self.has_table(name) {
            return Err(FeedError::NotFound(name.to_string()));
        }
        let (sender, receiver) = bounded(ZIP_PIPE_DEPTH);
        let path = self.path.clone();
        let entry = name.to_string();
        std::thread::Builder::new()
            .name(format!("zip-{name}"))
            .spawn(move || inflate_entry(&path, &entry, &sender))
            .map_err(|source| FeedError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(Box::new(ChunkReader::new(receiver)))
    }
}

fn is_top_level_entry(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\')
}

fn inflate_entry(path: &Path, entry: &str, sender: &Sender<io::Result<Vec<u8>>>) {
    let result = (|| -> io::Result<()> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_to_io)?;
        let mut reader = archive.by_name(entry).map_err(zip_to_io)?;
        loop {
            let mut chunk = vec![0; ZIP_PIPE_CHUNK_BYTES];
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                return Ok(());
            }
            chunk.truncate(read);
            if sender.send(Ok(chunk)).is_err() {
                // Reader went away.
                return Ok(());
            }
        }
    })();
    if let Err(err) = result {
        let _ = sender.send(Err(err));
    }
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

struct ChunkReader {
    receiver: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl ChunkReader {
    fn new(receiver: Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            receiver,
            chunk: Vec::new(),
            offset: 0,
            finished: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.offset < self.chunk.len() {
                let available = &self.chunk[self.offset..];
                let count = available.len().min(buf.len());
                buf[..count].copy_from_slice(&available[..count]);
                self.offset += count;
                return Ok(count);
            }
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.offset = 0;
                }
                Ok(Err(err)) => {
                    self.finished = true;
                    return Err(err);
                }
                Err(_) => self.finished = true,
            }
        }
    }
}

/// Tables held in memory. Used for uploaded archives and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    label: String,
    tables: BTreeMap<String, Arc<[u8]>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self {
            label: "<memory>".to_string(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.insert_table(name, contents);
        self
    }

    pub fn insert_table(&mut self, name: impl Into<String>, contents: impl AsRef<[u8]>) {
        self.tables
            .insert(name.into(), Arc::from(contents.as_ref()));
    }

    pub fn from_zip_bytes(bytes: Vec<u8>) -> Result<Self, FeedError> {
        let zip_error = |source| FeedError::Zip {
            path: PathBuf::from("<memory>"),
            source,
        };
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
        let mut feed = MemoryFeed::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(zip_error)?;
            if entry.is_dir() || !is_top_level_entry(entry.name()) {
                continue;
            }
            let name = entry.name().to_string();
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut contents)
                .map_err(|source| FeedError::Io {
                    path: PathBuf::from(&name),
                    source,
                })?;
            feed.insert_table(name, contents);
        }
        Ok(feed)
    }
}

impl FeedAccessor for MemoryFeed {
    fn source_label(&self) -> String {
        self.label.clone()
    }

    fn list_tables(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn open_table(&self, name: &str) -> Result<TableStream, FeedError> {
        self.tables
            .get(name)
            .map(|contents| Box::new(Cursor::new(Arc::clone(contents))) as TableStream)
            .ok_or_else(|| FeedError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
    }

    fn read_all(mut stream: TableStream) -> String {
        let mut out = String::new();
        stream.read_to_string(&mut out).expect("read table");
        out
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .expect("start file");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn directory_feed_lists_and_opens_tables() {
        let dir = temp_dir("gtfs_dir_feed");
        fs::create_dir_all(dir.join("nested")).expect("create dir");
        fs::write(dir.join(AGENCY_FILE), "agency_name\nMetro\n").expect("write");
        fs::write(dir.join(STOPS_FILE), "stop_id\nS1\n").expect("write");

        let feed = DirectoryFeed::open(&dir).expect("feed");
        assert_eq!(feed.list_tables().unwrap(), vec![AGENCY_FILE, STOPS_FILE]);
        assert!(feed.has_table(STOPS_FILE));
        assert!(!feed.has_table("nested"));
        assert_eq!(read_all(feed.open_table(STOPS_FILE).unwrap()), "stop_id\nS1\n");
        assert!(matches!(
            feed.open_table(ROUTES_FILE),
            Err(FeedError::NotFound(_))
        ));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zip_feed_streams_entries_independently() {
        let dir = temp_dir("gtfs_zip_feed");
        fs::create_dir_all(&dir).expect("create dir");
        let archive = dir.join("feed.zip");
        fs::write(
            &archive,
            zip_bytes(&[
                (ROUTES_FILE, "route_id\nR1\nR2\n"),
                ("extra/readme.txt", "ignored"),
            ]),
        )
        .expect("write zip");

        let feed = open_feed(&archive).expect("feed");
        assert_eq!(feed.list_tables().unwrap(), vec![ROUTES_FILE]);

        let first = feed.open_table(ROUTES_FILE).unwrap();
        let second = feed.open_table(ROUTES_FILE).unwrap();
        assert_eq!(read_all(second), "route_id\nR1\nR2\n");
        assert_eq!(read_all(first), "route_id\nR1\nR2\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn memory_feed_from_zip_bytes() {
        let source = FeedSource::Bytes(zip_bytes(&[(TRIPS_FILE, "trip_id\nT1\n")]));
        let feed = source.open().expect("feed");
        assert!(feed.has_table(TRIPS_FILE));
        assert_eq!(read_all(feed.open_table(TRIPS_FILE).unwrap()), "trip_id\nT1\n");
    }

    #[test]
    fn rejects_missing_paths_and_non_zip_bytes() {
        assert!(matches!(
            open_feed("/definitely/not/here"),
            Err(FeedError::MissingPath(_))
        ));
        assert!(matches!(
            FeedSource::Bytes(b"plain text".to_vec()).open(),
            Err(FeedError::InvalidInput(_))
        ));
    }
}
