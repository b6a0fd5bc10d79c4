//! Binary storage for review embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id_len: u16 (little-endian)
//! - review_id: [u8; id_len] (UTF-8)
//! - content_hash: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::embeddings::EmbeddingSpace;
use crate::semantic::index::{VectorEntry, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

/// Storage manager for review embeddings.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored vectors together with the space they were built in.
    pub fn load(&self) -> Result<(EmbeddingSpace, VectorIndex), VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        let dimensions = header.dimensions as usize;

        let mut index = VectorIndex::with_capacity(dimensions, header.entry_count as usize);
        for _ in 0..header.entry_count {
            let (id, content_hash, embedding) = read_entry(&mut reader, dimensions)?;
            // Skip entries that fail to insert (e.g., zero norm)
            if let Err(e) = index.insert(&id, content_hash, embedding) {
                log::warn!("dropping stored vector for review {}: {}", id, e);
            }
        }

        let space = EmbeddingSpace {
            model_id: header.model_id,
            dimensions,
        };
        Ok((space, index))
    }

    /// Write the index to a sibling temp file, fsync it, and return its path.
    ///
    /// Callers rename it over [`Self::path`] with [`Self::commit`]. Splitting the
    /// two lets the store stage every touched file before replacing any.
    pub fn stage(
        &self,
        index: &VectorIndex,
        space: &EmbeddingSpace,
    ) -> Result<PathBuf, VectorStorageError> {
        if index.dimensions() != space.dimensions {
            return Err(VectorStorageError::InvalidFormat(format!(
                "index has {} dimensions, space has {}",
                index.dimensions(),
                space.dimensions
            )));
        }
        let dimensions = u16::try_from(space.dimensions).map_err(|_| {
            VectorStorageError::InvalidFormat(format!("{} dimensions do not fit", space.dimensions))
        })?;

        let temp_path = self.path.with_extension("tmp");
        let result = write_to_file(&temp_path, index, &space.model_id, dimensions);

        if let Err(e) = result {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        Ok(temp_path)
    }

    /// Stage and rename into place. The store renames staged files itself.
    #[cfg(test)]
    pub fn save(&self, index: &VectorIndex, space: &EmbeddingSpace) -> Result<(), VectorStorageError> {
        let staged = self.stage(index, space)?;
        std::fs::rename(staged, &self.path)?;
        Ok(())
    }
}

fn write_to_file(
    path: &Path,
    index: &VectorIndex,
    model_id: &[u8; 32],
    dimensions: u16,
) -> Result<(), VectorStorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        dimensions,
        entry_count: index.len() as u64,
    };
    write_header(&mut writer, &header)?;

    // Sorted so identical indexes produce identical files
    let mut entries: Vec<(&str, &VectorEntry)> = index.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (id, entry) in entries {
        write_entry(&mut writer, id, entry)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes(slice_array(&header_bytes[43..47]));
    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    Ok(Header {
        version,
        model_id,
        dimensions: u16::from_le_bytes(slice_array(&header_bytes[33..35])),
        entry_count: u64::from_le_bytes(slice_array(&header_bytes[35..43])),
    })
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry<R: Read>(
    reader: &mut R,
    dimensions: usize,
) -> Result<(String, u64, Vec<f32>), VectorStorageError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let mut id_bytes = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    reader.read_exact(&mut id_bytes)?;
    let id = String::from_utf8(id_bytes)
        .map_err(|_| VectorStorageError::InvalidFormat("review id is not UTF-8".to_string()))?;

    let mut hash_bytes = [0u8; 8];
    reader.read_exact(&mut hash_bytes)?;
    let content_hash = u64::from_le_bytes(hash_bytes);

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((id, content_hash, embedding))
}

fn write_entry<W: Write>(writer: &mut W, id: &str, entry: &VectorEntry) -> Result<(), VectorStorageError> {
    let id_len = u16::try_from(id.len())
        .map_err(|_| VectorStorageError::InvalidFormat(format!("review id too long: {}", id)))?;
    writer.write_all(&id_len.to_le_bytes())?;
    writer.write_all(id.as_bytes())?;
    writer.write_all(&entry.content_hash.to_le_bytes())?;

    for &value in &entry.embedding {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

fn slice_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}
