//! Distributed input reader.
//!
//! Rank 0 reads the deck (and any files named in its `--INCLUDES` section),
//! splits it into sections and broadcasts everything except the bulk
//! geometry sections. Those excluded sections are shared only as
//! [`SectionPosition`] descriptors; every rank streams them from disk on
//! demand, so the file must be reachable from each rank that reads geometry.
//!
//! After construction all ranks hold an identical [`InputBuffer`] and
//! [`SectionIndex`], so parameter parsing gives the same result everywhere.

use crate::algs::collective::{all_gather_bytes, broadcast_bytes};
use crate::algs::communicator::Communicator;
use crate::algs::wire::{WireLen, cast_slice, cast_slice_from};
use crate::deck_error::DeckError;
use crate::io::section_store::{
    InputBuffer, SectionIndex, SectionLines, SectionPosition, SectionSource,
    normalize_section_name, scan_sections,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

const DECK_HEADER_VERSION: u32 = 1;

/// Name of the section listing further deck files.
pub const INCLUDES_SECTION: &str = "INCLUDES";

/// Which sections are kept out of the broadcast.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Section names excluded verbatim.
    pub excluded_names: Vec<String>,
    /// Any section whose name ends with one of these is excluded.
    pub excluded_suffixes: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            excluded_names: vec!["NODE COORDS".into()],
            excluded_suffixes: vec!["ELEMENTS".into()],
        }
    }
}

impl ReaderConfig {
    /// True if the (normalized) section name is streamed from disk.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_names.iter().any(|n| normalize_section_name(n) == name)
            || self
                .excluded_suffixes
                .iter()
                .any(|s| name.ends_with(&normalize_section_name(s)))
    }
}

/// What rank 0 shares with everyone, besides the line text.
#[derive(Debug, Serialize, Deserialize)]
struct DeckHeader {
    version: u32,
    input_file: PathBuf,
    in_memory: Vec<(String, usize, usize)>,
    on_disk: Vec<(String, SectionPosition)>,
    error: Option<String>,
}

/// Reader over one input deck, shared by all ranks of `comm`.
pub struct DeckReader<C: Communicator> {
    input_file: PathBuf,
    comm: C,
    verbose: bool,
    buffer: InputBuffer,
    index: SectionIndex,
    used: Mutex<BTreeSet<String>>,
    broadcast_len: usize,
}

impl<C: Communicator> std::fmt::Debug for DeckReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckReader")
            .field("input_file", &self.input_file)
            .field("rank", &self.comm.rank())
            .field("sections", &self.index.len())
            .finish()
    }
}

impl<C: Communicator> DeckReader<C> {
    /// Read `path` on rank 0 of `comm` and share it with all ranks.
    /// Collective over `comm`.
    pub fn new(path: impl AsRef<Path>, comm: C, verbose: bool) -> Result<Self, DeckError> {
        Self::with_config(path, comm, verbose, &ReaderConfig::default())
    }

    /// As [`DeckReader::new`] with an explicit exclusion policy.
    pub fn with_config(
        path: impl AsRef<Path>,
        comm: C,
        verbose: bool,
        config: &ReaderConfig,
    ) -> Result<Self, DeckError> {
        let path = path.as_ref();
        let mut payload = Vec::new();
        if comm.rank() == 0 {
            let (header, text) = match read_on_root(path, config) {
                Ok((header, text)) => (header, text),
                Err(e) => (
                    DeckHeader {
                        version: DECK_HEADER_VERSION,
                        input_file: path.to_path_buf(),
                        in_memory: Vec::new(),
                        on_disk: Vec::new(),
                        error: Some(e.to_string()),
                    },
                    String::new(),
                ),
            };
            let header_bytes = serde_json::to_vec(&header)?;
            let hdr = WireLen::new(header_bytes.len());
            payload.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
            payload.extend_from_slice(&header_bytes);
            payload.extend_from_slice(text.as_bytes());
        }
        broadcast_bytes(&comm, 0, &mut payload)?;

        let (header, text) = unpack_payload(&payload)?;
        if let Some(reason) = header.error {
            return Err(DeckError::DeckUnreadable {
                path: path.display().to_string(),
                reason,
            });
        }
        if header.version != DECK_HEADER_VERSION {
            return Err(DeckError::Malformed(format!(
                "deck header version {} (expected {DECK_HEADER_VERSION})",
                header.version
            )));
        }

        let buffer = InputBuffer::from_text(text);
        let mut index = SectionIndex::default();
        for (name, start, end) in header.in_memory {
            if end > buffer.len() || start > end {
                return Err(DeckError::Malformed(format!(
                    "section `{name}` range [{start},{end}) outside the shared buffer"
                )));
            }
            index.insert(name, SectionSource::InMemory { start, end })?;
        }
        for (name, pos) in header.on_disk {
            index.insert(name, SectionSource::OnDisk(pos))?;
        }

        let reader = Self {
            input_file: header.input_file,
            comm,
            verbose,
            buffer,
            index,
            used: Mutex::new(BTreeSet::new()),
            broadcast_len: payload.len(),
        };
        reader.record_section_used(INCLUDES_SECTION);
        if reader.comm.rank() == 0 && reader.verbose {
            log::info!(
                "read {} sections of {} ({} lines, {} bytes shared)",
                reader.index.len(),
                reader.input_file.display(),
                reader.buffer.len(),
                reader.broadcast_len
            );
        }
        Ok(reader)
    }

    /// Content lines of a section: comment stripped, trimmed, non-empty,
    /// in file order. Each call starts from the first line again; disk
    /// sections open a fresh stream. Records the section as used.
    pub fn lines_in_section(&self, name: &str) -> SectionLines<'_> {
        let name = normalize_section_name(name);
        self.record_section_used(&name);
        self.index.lines(&self.buffer, &name)
    }

    /// Collect a whole section, failing on the first stream error.
    pub fn collect_section(&self, name: &str) -> Result<Vec<String>, DeckError> {
        self.lines_in_section(name)
            .map(|l| l.map(|c| c.into_owned()))
            .collect()
    }

    /// True iff the section exists and has at least one content line.
    /// Does not mark the section as used.
    pub fn has_section(&self, name: &str) -> bool {
        let name = normalize_section_name(name);
        match self.index.lines(&self.buffer, &name).next() {
            Some(Ok(_)) => true,
            Some(Err(e)) => {
                log::debug!("section `{name}` could not be checked: {e}");
                false
            }
            None => false,
        }
    }

    /// Write the sections that exist but were never queried on any rank.
    /// Collective: the used sets of all ranks are merged first, so a section
    /// only one rank reads is not reported. Only rank 0 writes; every rank
    /// returns whether there were any.
    pub fn print_unknown_sections<W: Write>(&self, out: &mut W) -> Result<bool, DeckError> {
        let unknown = self.unknown_sections_on_all_ranks()?;
        if !unknown.is_empty() && self.comm.rank() == 0 {
            writeln!(out, "\nERROR!")?;
            writeln!(out, "--------")?;
            writeln!(out, "The following input file sections remained unused (obsolete or typo?):")?;
            for name in &unknown {
                writeln!(out, "--{name}")?;
            }
            writeln!(out)?;
        }
        Ok(!unknown.is_empty())
    }

    /// Names of sections never queried on this rank, sorted.
    pub fn unknown_sections(&self) -> Vec<String> {
        let used = self.used.lock();
        self.index
            .names()
            .filter(|n| !used.contains(*n))
            .map(str::to_string)
            .collect()
    }

    /// Names of sections never queried on any rank of the reader's
    /// communicator, sorted. Collective.
    pub fn unknown_sections_on_all_ranks(&self) -> Result<Vec<String>, DeckError> {
        let mine = self.used.lock().iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        let mut used = BTreeSet::new();
        for piece in all_gather_bytes(&self.comm, mine.as_bytes())? {
            let names = String::from_utf8(piece)
                .map_err(|e| DeckError::comm(0, format!("used section names: {e}")))?;
            used.extend(names.lines().map(str::to_string));
        }
        Ok(self
            .index
            .names()
            .filter(|n| !used.contains(*n))
            .map(str::to_string)
            .collect())
    }

    /// Record a section as used without reading it.
    pub fn mark_used(&self, name: &str) {
        self.record_section_used(&normalize_section_name(name));
    }

    fn record_section_used(&self, name: &str) {
        let mut used = self.used.lock();
        if !used.contains(name) {
            used.insert(name.to_string());
        }
    }

    /// Whether the section has been queried through [`Self::lines_in_section`].
    pub fn is_section_used(&self, name: &str) -> bool {
        self.used.lock().contains(&normalize_section_name(name))
    }

    /// Backing store of a section, if present.
    pub fn section_source(&self, name: &str) -> Option<&SectionSource> {
        self.index.get(&normalize_section_name(name))
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.index.names()
    }

    /// Bytes that rank 0 broadcast for this deck.
    pub fn broadcast_len(&self) -> usize {
        self.broadcast_len
    }

    /// The shared line buffer.
    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    /// Directory against which relative paths in this deck resolve.
    pub fn input_dir(&self) -> PathBuf {
        match self.input_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

fn unpack_payload(payload: &[u8]) -> Result<(DeckHeader, String), DeckError> {
    let hdr_size = std::mem::size_of::<WireLen>();
    let malformed = || DeckError::Malformed("truncated deck broadcast".into());
    let hdr_len = cast_slice_from::<WireLen>(payload.get(..hdr_size).ok_or_else(malformed)?)[0].get();
    let header_bytes = payload
        .get(hdr_size..hdr_size + hdr_len)
        .ok_or_else(malformed)?;
    let header: DeckHeader = serde_json::from_slice(header_bytes)?;
    let text = String::from_utf8(payload[hdr_size + hdr_len..].to_vec())
        .map_err(|e| DeckError::Malformed(format!("deck text is not UTF-8: {e}")))?;
    Ok((header, text))
}

/// Rank-0 side: read the deck and its includes, build header and line text.
fn read_on_root(path: &Path, config: &ReaderConfig) -> Result<(DeckHeader, String), DeckError> {
    let mut scanned = Vec::new();
    let mut visited = HashSet::new();
    read_file_recursive(path, config, &mut visited, &mut scanned)?;

    let mut text = String::new();
    let mut line_no = 0usize;
    let mut in_memory = Vec::new();
    let mut on_disk = Vec::new();
    let mut seen = HashSet::new();
    for section in scanned {
        if !seen.insert(section.name.clone()) {
            return Err(DeckError::Malformed(format!(
                "section `{}` is defined more than once",
                section.name
            )));
        }
        if config.is_excluded(&section.name) {
            on_disk.push((section.name, section.position));
        } else {
            let start = line_no;
            for line in &section.lines {
                text.push_str(line);
                text.push('\n');
                line_no += 1;
            }
            in_memory.push((section.name, start, line_no));
        }
    }
    Ok((
        DeckHeader {
            version: DECK_HEADER_VERSION,
            input_file: path.to_path_buf(),
            in_memory,
            on_disk,
            error: None,
        },
        text,
    ))
}

fn read_file_recursive(
    path: &Path,
    config: &ReaderConfig,
    visited: &mut HashSet<PathBuf>,
    out: &mut Vec<crate::io::section_store::ScannedSection>,
) -> Result<(), DeckError> {
    let canonical = path.canonicalize().map_err(|e| DeckError::DeckUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if !visited.insert(canonical) {
        return Err(DeckError::Malformed(format!(
            "file `{}` is included more than once",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| DeckError::DeckUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let sections = scan_sections(path, &text, |name| config.is_excluded(name));
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut includes = Vec::new();
    for section in sections {
        if section.name == INCLUDES_SECTION {
            includes.extend(section.lines.iter().map(|l| base.join(l)));
            // the includes list itself is not part of the shared deck
            continue;
        }
        out.push(section);
    }
    for inc in includes {
        read_file_recursive(&inc, config, visited, out)?;
    }
    Ok(())
}
