//! Immutable index segments.
//!
//! A segment is written once when a writer flushes its buffer and never
//! modified afterwards. Each segment consists of three files:
//!
//! - `{name}.pst`: postings, term to ascending doc-ordinal lists
//! - `{name}.doc`: stored fields, ordinal to JSON document payload
//! - `{name}.meta`: JSON [`SegmentInfo`]
//!
//! Binary files carry a magic/version header and a CRC32 trailer which is
//! verified when the segment is opened.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::data::Document;
use crate::error::{Result, SalixError};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

const POSTINGS_MAGIC: u32 = 0x534C_5053; // "SLPS"
const STORED_MAGIC: u32 = 0x534C_4443; // "SLDC"
const FORMAT_VERSION: u32 = 1;

/// Metadata for one immutable segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment file name stem, e.g. `segment_000003`.
    pub name: String,
    /// Monotonic generation number within the shard.
    pub generation: u32,
    /// Number of documents in the segment.
    pub doc_count: u32,
    /// Smallest doc ordinal in the segment.
    pub min_ordinal: u64,
    /// Largest doc ordinal in the segment.
    pub max_ordinal: u64,
}

impl SegmentInfo {
    pub fn postings_file(&self) -> String {
        format!("{}.pst", self.name)
    }

    pub fn stored_file(&self) -> String {
        format!("{}.doc", self.name)
    }

    pub fn meta_file(&self) -> String {
        format!("{}.meta", self.name)
    }

    /// True if the ordinal falls within this segment's range.
    pub fn contains(&self, ordinal: u64) -> bool {
        ordinal >= self.min_ordinal && ordinal <= self.max_ordinal
    }
}

/// Writer producing one segment from an in-memory buffer.
pub struct SegmentWriter {
    storage: Arc<dyn Storage>,
}

impl SegmentWriter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        SegmentWriter { storage }
    }

    /// Write postings, stored fields and metadata for a new segment.
    ///
    /// `docs` must be non-empty and in ascending ordinal order; postings
    /// lists must reference only ordinals present in `docs`.
    pub fn write(
        &self,
        generation: u32,
        postings: &AHashMap<String, Vec<u64>>,
        docs: &[(u64, Document)],
    ) -> Result<SegmentInfo> {
        if docs.is_empty() {
            return Err(SalixError::invalid_argument(
                "cannot write an empty segment",
            ));
        }

        let info = SegmentInfo {
            name: format!("segment_{generation:06}"),
            generation,
            doc_count: docs.len() as u32,
            min_ordinal: docs.first().map(|(ordinal, _)| *ordinal).unwrap_or(0),
            max_ordinal: docs.last().map(|(ordinal, _)| *ordinal).unwrap_or(0),
        };

        self.write_postings(&info, postings)?;
        self.write_stored(&info, docs)?;
        self.write_meta(&info)?;

        Ok(info)
    }

    fn write_postings(
        &self,
        info: &SegmentInfo,
        postings: &AHashMap<String, Vec<u64>>,
    ) -> Result<()> {
        // Sort terms so segment files are deterministic.
        let mut terms: Vec<&String> = postings.keys().collect();
        terms.sort();

        let mut writer = StructWriter::new(self.storage.create_output(&info.postings_file())?);
        writer.write_u32(POSTINGS_MAGIC)?;
        writer.write_u32(FORMAT_VERSION)?;
        writer.write_u32(terms.len() as u32)?;
        for term in terms {
            let ordinals = &postings[term];
            writer.write_string(term)?;
            writer.write_u32(ordinals.len() as u32)?;
            for ordinal in ordinals {
                writer.write_u64(*ordinal)?;
            }
        }
        writer.close()
    }

    fn write_stored(&self, info: &SegmentInfo, docs: &[(u64, Document)]) -> Result<()> {
        let mut writer = StructWriter::new(self.storage.create_output(&info.stored_file())?);
        writer.write_u32(STORED_MAGIC)?;
        writer.write_u32(FORMAT_VERSION)?;
        writer.write_u32(docs.len() as u32)?;
        for (ordinal, doc) in docs {
            let json = serde_json::to_vec(doc)?;
            writer.write_u64(*ordinal)?;
            writer.write_bytes(&json)?;
        }
        writer.close()
    }

    fn write_meta(&self, info: &SegmentInfo) -> Result<()> {
        let json = serde_json::to_vec(info)?;
        use std::io::Write;
        let mut output = self.storage.create_output(&info.meta_file())?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        Ok(())
    }
}

/// Reader over one segment, fully loaded and checksum-verified on open.
#[derive(Debug)]
pub struct SegmentReader {
    info: SegmentInfo,
    postings: AHashMap<String, Vec<u64>>,
    docs: AHashMap<u64, Document>,
    ordinals: Vec<u64>,
}

impl SegmentReader {
    /// Open a segment, verifying magic, version and checksums.
    pub fn open(storage: &Arc<dyn Storage>, info: SegmentInfo) -> Result<Self> {
        let postings = Self::read_postings(storage, &info)?;
        let (docs, ordinals) = Self::read_stored(storage, &info)?;

        if docs.len() as u32 != info.doc_count {
            return Err(SalixError::corrupt(format!(
                "segment {}: stored {} documents, metadata says {}",
                info.name,
                docs.len(),
                info.doc_count
            )));
        }

        Ok(SegmentReader {
            info,
            postings,
            docs,
            ordinals,
        })
    }

    fn read_postings(
        storage: &Arc<dyn Storage>,
        info: &SegmentInfo,
    ) -> Result<AHashMap<String, Vec<u64>>> {
        let mut reader = StructReader::new(storage.open_input(&info.postings_file())?)?;
        check_header(&mut reader, POSTINGS_MAGIC, &info.postings_file())?;

        let term_count = reader.read_u32()?;
        let mut postings = AHashMap::with_capacity(term_count as usize);
        for _ in 0..term_count {
            let term = reader.read_string()?;
            let count = reader.read_u32()?;
            let mut ordinals = Vec::with_capacity(count as usize);
            for _ in 0..count {
                ordinals.push(reader.read_u64()?);
            }
            postings.insert(term, ordinals);
        }
        reader.finish()?;
        Ok(postings)
    }

    fn read_stored(
        storage: &Arc<dyn Storage>,
        info: &SegmentInfo,
    ) -> Result<(AHashMap<u64, Document>, Vec<u64>)> {
        let mut reader = StructReader::new(storage.open_input(&info.stored_file())?)?;
        check_header(&mut reader, STORED_MAGIC, &info.stored_file())?;

        let doc_count = reader.read_u32()?;
        let mut docs = AHashMap::with_capacity(doc_count as usize);
        let mut ordinals = Vec::with_capacity(doc_count as usize);
        for _ in 0..doc_count {
            let ordinal = reader.read_u64()?;
            let json = reader.read_bytes()?;
            let doc: Document = serde_json::from_slice(&json)?;
            docs.insert(ordinal, doc);
            ordinals.push(ordinal);
        }
        reader.finish()?;
        Ok((docs, ordinals))
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Postings for a term, in ascending ordinal order.
    pub fn term_postings(&self, term: &str) -> Option<&[u64]> {
        self.postings.get(term).map(|v| v.as_slice())
    }

    /// A stored document by ordinal.
    pub fn doc(&self, ordinal: u64) -> Option<&Document> {
        self.docs.get(&ordinal)
    }

    /// All ordinals in this segment, in ascending order.
    pub fn ordinals(&self) -> &[u64] {
        &self.ordinals
    }

    pub fn doc_count(&self) -> u32 {
        self.info.doc_count
    }
}

fn check_header(reader: &mut StructReader, magic: u32, file: &str) -> Result<()> {
    let found = reader.read_u32()?;
    if found != magic {
        return Err(SalixError::corrupt(format!(
            "{file}: bad magic {found:#010x}"
        )));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(SalixError::corrupt(format!(
            "{file}: unsupported format version {version}"
        )));
    }
    Ok(())
}

/// Read a segment's metadata file.
pub fn read_segment_meta(storage: &Arc<dyn Storage>, meta_file: &str) -> Result<SegmentInfo> {
    let input = storage.open_input(meta_file)?;
    let info: SegmentInfo = serde_json::from_reader(input)?;
    Ok(info)
}

/// Name of the manifest listing a shard's committed segments.
pub const MANIFEST_FILE: &str = "segments.json";

/// The committed segment set of one shard's index.
///
/// Readers see exactly the segments listed here; segments written but not
/// yet committed are invisible to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub segments: Vec<SegmentInfo>,
}

impl IndexManifest {
    /// Total committed document count.
    pub fn doc_count(&self) -> u32 {
        self.segments.iter().map(|segment| segment.doc_count).sum()
    }
}

/// Read the manifest, or an empty one if none has been committed yet.
pub fn read_index_manifest(storage: &Arc<dyn Storage>) -> Result<IndexManifest> {
    if !storage.file_exists(MANIFEST_FILE) {
        return Ok(IndexManifest {
            version: 1,
            segments: Vec::new(),
        });
    }
    let input = storage.open_input(MANIFEST_FILE)?;
    let manifest: IndexManifest = serde_json::from_reader(input)?;
    Ok(manifest)
}

/// Atomically replace the manifest (tmp file + rename).
pub fn write_index_manifest(storage: &Arc<dyn Storage>, manifest: &IndexManifest) -> Result<()> {
    let json = serde_json::to_vec(manifest)?;
    let tmp_file = format!("{MANIFEST_FILE}.tmp");

    use std::io::Write;
    let mut output = storage.create_output(&tmp_file)?;
    output.write_all(&json)?;
    output.flush_and_sync()?;
    drop(output);

    storage.rename_file(&tmp_file, MANIFEST_FILE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn sample_postings() -> AHashMap<String, Vec<u64>> {
        let mut postings = AHashMap::new();
        postings.insert("body:hello".to_string(), vec![0, 1]);
        postings.insert("body:world".to_string(), vec![1]);
        postings
    }

    fn sample_docs() -> Vec<(u64, Document)> {
        vec![
            (0, Document::new().add_field("body", "hello")),
            (1, Document::new().add_field("body", "hello world")),
        ]
    }

    #[test]
    fn test_write_and_open() {
        let storage = make_storage();
        let writer = SegmentWriter::new(storage.clone());

        let info = writer.write(3, &sample_postings(), &sample_docs()).unwrap();
        assert_eq!(info.name, "segment_000003");
        assert_eq!(info.doc_count, 2);
        assert_eq!(info.min_ordinal, 0);
        assert_eq!(info.max_ordinal, 1);

        let reader = SegmentReader::open(&storage, info.clone()).unwrap();
        assert_eq!(reader.term_postings("body:hello").unwrap(), &[0, 1]);
        assert_eq!(reader.term_postings("body:world").unwrap(), &[1]);
        assert!(reader.term_postings("body:missing").is_none());
        assert_eq!(
            reader.doc(1).unwrap().get("body").and_then(|v| v.as_text()),
            Some("hello world")
        );
        assert_eq!(reader.ordinals(), &[0, 1]);
    }

    #[test]
    fn test_meta_round_trip() {
        let storage = make_storage();
        let writer = SegmentWriter::new(storage.clone());
        let info = writer.write(0, &sample_postings(), &sample_docs()).unwrap();

        let read = read_segment_meta(&storage, &info.meta_file()).unwrap();
        assert_eq!(read.name, info.name);
        assert_eq!(read.doc_count, info.doc_count);
    }

    #[test]
    fn test_rejects_empty_segment() {
        let storage = make_storage();
        let writer = SegmentWriter::new(storage);
        let err = writer.write(0, &AHashMap::new(), &[]).unwrap_err();
        assert!(matches!(err, SalixError::InvalidArgument(_)));
    }

    #[test]
    fn test_corrupted_postings_rejected() {
        let storage = make_storage();
        let writer = SegmentWriter::new(storage.clone());
        let info = writer.write(0, &sample_postings(), &sample_docs()).unwrap();

        // Flip a byte in the middle of the postings file.
        use std::io::{Read, Write};
        let mut raw = Vec::new();
        storage
            .open_input(&info.postings_file())
            .unwrap()
            .read_to_end(&mut raw)
            .unwrap();
        let middle = raw.len() / 2;
        raw[middle] ^= 0xFF;
        let mut output = storage.create_output(&info.postings_file()).unwrap();
        output.write_all(&raw).unwrap();
        output.flush_and_sync().unwrap();
        drop(output);

        let err = SegmentReader::open(&storage, info).unwrap_err();
        assert!(matches!(err, SalixError::Corrupt(_)));
    }
}
