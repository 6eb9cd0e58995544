//! Durable storage for an [`IndexState`].
//!
//! The state lives in two files: a binary vector matrix and a JSON metadata
//! document (row map, chunk records, book partitions). They are replaced
//! together under a write-ahead commit marker:
//!
//! 1. both files are written to `*.tmp` siblings and fsynced
//! 2. `{metadata}.commit` is created; from here on the save is committed
//! 3. both temp files are renamed over the live files
//! 4. the marker is removed
//!
//! [`load`] finishes a committed save left behind by a crash (roll forward)
//! or discards an uncommitted one (roll back), so the live pair always
//! describes the same number of rows.

use crate::chunk_store::{BookPartition, ChunkStore};
use crate::row_map::RowMap;
use crate::state::IndexState;
use crate::types::Chunk;
use crate::vector_index::FlatIndex;
use bookchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const VECTOR_MAGIC: &[u8; 4] = b"BCVX";
const FORMAT_VERSION: u32 = 1;
/// magic + version + dimension + row count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Locations of the two persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

/// What [`recover`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// No interrupted save
    Clean,
    /// A committed save was completed
    RolledForward,
    /// An uncommitted save was discarded
    RolledBack,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    format_version: u32,
    dimension: usize,
    vector_count: usize,
    /// Chunk id of every vector row, in row order
    row_map: Vec<String>,
    /// Live chunk records, in row order
    chunks: Vec<Chunk>,
    /// Partitions, in book order
    books: Vec<BookEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BookEntry {
    book_id: String,
    #[serde(flatten)]
    partition: BookPartition,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl IndexPaths {
    pub fn new(vectors: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            vectors: vectors.into(),
            metadata: metadata.into(),
        }
    }

    /// `{base}.vectors` and `{base}_metadata.json`.
    pub fn from_base(base: &Path) -> Self {
        Self {
            vectors: with_suffix(base, ".vectors"),
            metadata: with_suffix(base, "_metadata.json"),
        }
    }

    /// Whether either live artifact exists.
    pub fn exists(&self) -> bool {
        self.vectors.exists() || self.metadata.exists()
    }

    fn commit_marker(&self) -> PathBuf {
        with_suffix(&self.metadata, ".commit")
    }

    fn vectors_tmp(&self) -> PathBuf {
        with_suffix(&self.vectors, ".tmp")
    }

    fn metadata_tmp(&self) -> PathBuf {
        with_suffix(&self.metadata, ".tmp")
    }
}

/// Write the whole state to `paths`, replacing what was there.
pub fn save(state: &IndexState, paths: &IndexPaths) -> AppResult<()> {
    for path in [&paths.vectors, &paths.metadata] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }

    let vectors_tmp = paths.vectors_tmp();
    let metadata_tmp = paths.metadata_tmp();

    let staged = write_vectors(state.vectors(), &vectors_tmp)
        .and_then(|_| write_metadata(state, &metadata_tmp));
    if let Err(e) = staged {
        let _ = fs::remove_file(&vectors_tmp);
        let _ = fs::remove_file(&metadata_tmp);
        return Err(e);
    }

    let marker = paths.commit_marker();
    File::create(&marker)?.sync_all()?;
    sync_parent(&marker)?;

    fs::rename(&vectors_tmp, &paths.vectors)?;
    fs::rename(&metadata_tmp, &paths.metadata)?;
    sync_parent(&paths.vectors)?;
    sync_parent(&paths.metadata)?;

    fs::remove_file(&marker)?;

    tracing::info!(
        "Saved index to {:?} ({} vectors, {} chunks)",
        paths.vectors,
        state.vectors().len(),
        state.chunks().len()
    );
    Ok(())
}

/// Load a state from `paths`.
///
/// Returns `NotFound` when neither file exists, and `CorruptState` when the
/// files disagree with each other or are malformed.
pub fn load(paths: &IndexPaths) -> AppResult<IndexState> {
    recover(paths)?;

    match (paths.vectors.exists(), paths.metadata.exists()) {
        (false, false) => {
            return Err(AppError::NotFound(format!(
                "No index at {:?}",
                paths.metadata
            )))
        }
        (true, false) | (false, true) => {
            return Err(AppError::CorruptState(format!(
                "Only one of {:?} and {:?} exists",
                paths.vectors, paths.metadata
            )))
        }
        (true, true) => {}
    }

    let vectors = read_vectors(&paths.vectors)?;

    let bytes = fs::read(&paths.metadata)?;
    let metadata: MetadataFile = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::CorruptState(format!("Unreadable metadata {:?}: {}", paths.metadata, e))
    })?;

    if metadata.format_version != FORMAT_VERSION {
        return Err(AppError::CorruptState(format!(
            "Unsupported metadata format version {}",
            metadata.format_version
        )));
    }

    if metadata.dimension != vectors.dimension() {
        return Err(AppError::CorruptState(format!(
            "Metadata dimension {} but vector file dimension {}",
            metadata.dimension,
            vectors.dimension()
        )));
    }

    if metadata.vector_count != vectors.len() || metadata.row_map.len() != vectors.len() {
        return Err(AppError::CorruptState(format!(
            "Vector file has {} rows but metadata records {} ({} row map entries)",
            vectors.len(),
            metadata.vector_count,
            metadata.row_map.len()
        )));
    }

    let row_map = RowMap::from_chunk_ids(metadata.row_map)?;
    let books = metadata
        .books
        .into_iter()
        .map(|entry| (entry.book_id, entry.partition))
        .collect();
    let chunks = ChunkStore::restore(metadata.chunks, books);

    let state = IndexState::from_parts(vectors, row_map, chunks)?;

    tracing::info!(
        "Loaded index from {:?} ({} vectors, {} chunks, {} books)",
        paths.vectors,
        state.vectors().len(),
        state.chunks().len(),
        state.chunks().book_count()
    );
    Ok(state)
}

/// Finish or discard a save interrupted by a crash.
pub fn recover(paths: &IndexPaths) -> AppResult<Recovery> {
    let marker = paths.commit_marker();
    let staged = [
        (paths.vectors_tmp(), &paths.vectors),
        (paths.metadata_tmp(), &paths.metadata),
    ];

    if marker.exists() {
        for (tmp, live) in &staged {
            if tmp.exists() {
                fs::rename(tmp, live)?;
            }
        }
        sync_parent(&paths.metadata)?;
        fs::remove_file(&marker)?;
        tracing::warn!("Completed interrupted index save at {:?}", paths.metadata);
        return Ok(Recovery::RolledForward);
    }

    let mut discarded = false;
    for (tmp, _) in &staged {
        if tmp.exists() {
            fs::remove_file(tmp)?;
            discarded = true;
        }
    }

    if discarded {
        tracing::warn!("Discarded uncommitted index save at {:?}", paths.metadata);
        Ok(Recovery::RolledBack)
    } else {
        Ok(Recovery::Clean)
    }
}

fn write_vectors(vectors: &FlatIndex, path: &Path) -> AppResult<()> {
    let dimension = u32::try_from(vectors.dimension()).map_err(|_| {
        AppError::Validation(format!("Dimension {} too large to store", vectors.dimension()))
    })?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(VECTOR_MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&dimension.to_le_bytes())?;
    writer.write_all(&(vectors.len() as u64).to_le_bytes())?;
    for value in vectors.as_slice() {
        writer.write_all(&value.to_le_bytes())?;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn write_metadata(state: &IndexState, path: &Path) -> AppResult<()> {
    let chunks = state.chunks();
    let metadata = MetadataFile {
        format_version: FORMAT_VERSION,
        dimension: state.dimension(),
        vector_count: state.vectors().len(),
        row_map: state.row_map().chunk_ids().to_vec(),
        chunks: state
            .row_map()
            .chunk_ids()
            .iter()
            .filter_map(|id| chunks.get(id).ok().cloned())
            .collect(),
        books: chunks
            .partitions()
            .map(|(book_id, partition)| BookEntry {
                book_id: book_id.to_string(),
                partition: partition.clone(),
            })
            .collect(),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &metadata)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn read_vectors(path: &Path) -> AppResult<FlatIndex> {
    let bytes = fs::read(path)?;
    let corrupt = |detail: String| AppError::CorruptState(format!("{:?}: {}", path, detail));

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
    }
    if &bytes[0..4] != VECTOR_MAGIC {
        return Err(corrupt("not a vector file".to_string()));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", version)));
    }

    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let count = u64::from_le_bytes([
        bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18], bytes[19],
    ]);
    if dimension == 0 {
        return Err(corrupt("zero dimension".to_string()));
    }

    let body = &bytes[HEADER_LEN..];
    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(dimension))
        .and_then(|n| n.checked_mul(4));
    if expected != Some(body.len()) {
        return Err(corrupt(format!(
            "header declares {} rows of dimension {} but body has {} bytes",
            count,
            dimension,
            body.len()
        )));
    }

    let data = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    FlatIndex::from_raw(dimension, data)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> AppResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> AppResult<()> {
    Ok(())
}
