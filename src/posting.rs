use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};

/// Byte width of the entry count that prefixes every posting list.
const HEADER_SIZE: usize = 4;
const ENTRY_SIZE: usize = std::mem::size_of::<PostingEntry>();

/// One document's occurrence count for a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PostingEntry {
    pub doc_id: u32,
    pub frequency: u32,
}

impl PostingEntry {
    fn to_le(self) -> Self {
        Self {
            doc_id: self.doc_id.to_le(),
            frequency: self.frequency.to_le(),
        }
    }

    fn from_le(self) -> Self {
        Self {
            doc_id: u32::from_le(self.doc_id),
            frequency: u32::from_le(self.frequency),
        }
    }
}

/// The value stored under a word key.
///
/// Binary format:
/// - 4 bytes: entry count N (u32 LE)
/// - N * 8 bytes: `(doc_id u32 LE, frequency u32 LE)` in insertion order
///
/// Doc ids are unique within a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    entries: Vec<PostingEntry>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stored list. `word` only labels the error.
    pub fn decode(word: &str, bytes: &[u8]) -> Result<Self> {
        let corrupt = || Error::CorruptPosting {
            word: word.to_string(),
            len: bytes.len(),
        };

        let header: [u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(corrupt)?;
        let count = u32::from_le_bytes(header) as usize;

        let body = &bytes[HEADER_SIZE..];
        if body.len() != count * ENTRY_SIZE {
            return Err(corrupt());
        }

        // Stored values carry no alignment guarantee.
        let entries = bytemuck::pod_collect_to_vec::<u8, PostingEntry>(body)
            .into_iter()
            .map(PostingEntry::from_le)
            .collect();

        Ok(Self { entries })
    }

    pub fn encode(&self) -> Vec<u8> {
        let le: Vec<PostingEntry> =
            self.entries.iter().map(|e| e.to_le()).collect();

        let mut out =
            Vec::with_capacity(HEADER_SIZE + self.entries.len() * ENTRY_SIZE);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&le));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingEntry> {
        self.entries.iter()
    }

    pub fn frequency(&self, doc_id: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.doc_id == doc_id)
            .map(|e| e.frequency)
    }

    /// Set the frequency for `doc_id`, keeping its position if present.
    /// A zero frequency removes the entry.
    pub fn set(&mut self, doc_id: u32, frequency: u32) {
        if frequency == 0 {
            self.remove(doc_id);
            return;
        }
        match self.entries.iter_mut().find(|e| e.doc_id == doc_id) {
            Some(entry) => entry.frequency = frequency,
            None => self.entries.push(PostingEntry { doc_id, frequency }),
        }
    }

    pub fn remove(&mut self, doc_id: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.doc_id != doc_id);
        self.entries.len() != before
    }
}
