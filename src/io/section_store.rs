//! Line-oriented section store.
//!
//! An input deck is a flat text file of sections. A section starts at a header
//! line beginning with `--` followed by its name and ends where the next header
//! starts. Everything from `//` to the end of a line is a comment.
//!
//! Section contents live in one of two places:
//! - [`SectionSource::InMemory`]: a `[start, end)` range of the shared
//!   [`InputBuffer`], identical on every rank;
//! - [`SectionSource::OnDisk`]: a [`SectionPosition`] descriptor, streamed from
//!   the file on each query.
//!
//! Both are consumed through the same pull-based [`SectionLines`] sequence.

use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;

/// Normalize a section name: leading and trailing `-` removed, whitespace
/// runs collapsed to one space, upper case.
///
/// `"--STRUCTURE  ELEMENTS"`, `"structure elements"` and
/// `"---------STRUCTURE ELEMENTS"` all give `"STRUCTURE ELEMENTS"`.
pub fn normalize_section_name(name: &str) -> String {
    let core = name.trim().trim_matches('-');
    core.split_whitespace()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// If `line` is a section header, return its normalized name.
pub fn section_header(line: &str) -> Option<String> {
    let trimmed = strip_comment(line).trim();
    if !trimmed.starts_with("--") {
        return None;
    }
    let name = normalize_section_name(trimmed);
    (!name.is_empty()).then_some(name)
}

/// Remove a trailing `//` comment.
pub fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// The content of a line: comment stripped and trimmed, or `None` if nothing
/// is left.
pub fn content_of(line: &str) -> Option<&str> {
    let c = strip_comment(line).trim();
    (!c.is_empty()).then_some(c)
}

/// Where an excluded section lives on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPosition {
    /// File holding the section (the top-level deck or an include).
    pub file: PathBuf,
    /// Byte offset of the first line after the header.
    pub byte_offset: u64,
    /// Number of raw lines (content, comments and blanks) in the section.
    pub line_count: usize,
}

/// Backing store of one section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionSource {
    /// Lines `[start, end)` of the shared buffer.
    InMemory { start: usize, end: usize },
    /// Streamed from disk per query.
    OnDisk(SectionPosition),
}

/// Owned text of all broadcast lines plus the line boundaries.
///
/// Line views borrow from the buffer, so none can outlive it.
#[derive(Clone, Debug, Default)]
pub struct InputBuffer {
    text: String,
    lines: Vec<(usize, usize)>,
}

impl InputBuffer {
    /// Build from text whose lines are separated by `\n`.
    pub fn from_text(text: String) -> Self {
        let mut lines = Vec::new();
        if !text.is_empty() {
            let mut start = 0;
            for (i, b) in text.bytes().enumerate() {
                if b == b'\n' {
                    lines.push((start, i));
                    start = i + 1;
                }
            }
            if start < text.len() {
                lines.push((start, text.len()));
            }
        }
        Self { text, lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, i: usize) -> &str {
        let (a, b) = self.lines[i];
        &self.text[a..b]
    }

    /// Size of the backing text in bytes.
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Section name → backing store. A name maps to exactly one source.
#[derive(Clone, Debug, Default)]
pub struct SectionIndex {
    entries: BTreeMap<String, SectionSource>,
}

impl SectionIndex {
    /// Insert a section; a second definition of the same name is an error.
    pub fn insert(&mut self, name: String, source: SectionSource) -> Result<(), DeckError> {
        if self.entries.contains_key(&name) {
            return Err(DeckError::Malformed(format!(
                "section `{name}` is defined more than once"
            )));
        }
        self.entries.insert(name, source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SectionSource> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SectionSource)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Open the lazy line sequence of `name`. Unknown names give an empty
    /// sequence.
    pub fn lines<'a>(&'a self, buffer: &'a InputBuffer, name: &str) -> SectionLines<'a> {
        match self.entries.get(name) {
            None => SectionLines::Empty,
            Some(SectionSource::InMemory { start, end }) => SectionLines::InMemory {
                buffer,
                next: *start,
                end: *end,
            },
            Some(SectionSource::OnDisk(pos)) => SectionLines::Pending(pos.clone()),
        }
    }
}

/// Finite, restartable-per-query sequence of content lines of one section.
///
/// In-memory lines are borrowed; streamed lines are owned. Stream failures
/// surface as `Err` items, after which the sequence ends.
pub enum SectionLines<'a> {
    Empty,
    InMemory {
        buffer: &'a InputBuffer,
        next: usize,
        end: usize,
    },
    /// A disk section whose file is opened on the first pull.
    Pending(SectionPosition),
    Stream {
        reader: BufReader<File>,
        remaining: usize,
        scratch: String,
    },
}

impl SectionLines<'_> {
    fn open(pos: &SectionPosition) -> Result<BufReader<File>, DeckError> {
        let mut file = File::open(&pos.file).map_err(|e| DeckError::DeckUnreadable {
            path: pos.file.display().to_string(),
            reason: e.to_string(),
        })?;
        file.seek(SeekFrom::Start(pos.byte_offset))?;
        Ok(BufReader::new(file))
    }
}

impl<'a> Iterator for SectionLines<'a> {
    type Item = Result<Cow<'a, str>, DeckError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self {
                SectionLines::Empty => return None,
                SectionLines::InMemory { buffer, next, end } => {
                    if *next >= *end {
                        return None;
                    }
                    let buffer: &'a InputBuffer = *buffer;
                    let line = buffer.line(*next);
                    *next += 1;
                    if let Some(c) = content_of(line) {
                        return Some(Ok(Cow::Borrowed(c)));
                    }
                }
                SectionLines::Pending(pos) => {
                    let remaining = pos.line_count;
                    match Self::open(pos) {
                        Ok(reader) => {
                            *self = SectionLines::Stream {
                                reader,
                                remaining,
                                scratch: String::new(),
                            }
                        }
                        Err(e) => {
                            *self = SectionLines::Empty;
                            return Some(Err(e));
                        }
                    }
                }
                SectionLines::Stream {
                    reader,
                    remaining,
                    scratch,
                } => {
                    if *remaining == 0 {
                        return None;
                    }
                    scratch.clear();
                    match reader.read_line(scratch) {
                        Ok(0) => {
                            *self = SectionLines::Empty;
                            return None;
                        }
                        Ok(_) => {
                            *remaining -= 1;
                            if let Some(c) = content_of(scratch) {
                                return Some(Ok(Cow::Owned(c.to_string())));
                            }
                        }
                        Err(e) => {
                            *self = SectionLines::Empty;
                            return Some(Err(e.into()));
                        }
                    }
                }
            }
        }
    }
}

/// One section found while scanning a file on the reading rank.
#[derive(Debug)]
pub(crate) struct ScannedSection {
    pub name: String,
    pub position: SectionPosition,
    /// Content lines; left empty for excluded sections.
    pub lines: Vec<String>,
}

/// Split a deck into sections. Content of sections for which `exclude`
/// returns true is not kept, only its position.
pub(crate) fn scan_sections(
    file: &std::path::Path,
    text: &str,
    exclude: impl Fn(&str) -> bool,
) -> Vec<ScannedSection> {
    let mut out: Vec<ScannedSection> = Vec::new();
    let mut offset = 0u64;
    for raw in text.split_inclusive('\n') {
        let next_offset = offset + raw.len() as u64;
        if let Some(name) = section_header(raw) {
            out.push(ScannedSection {
                name,
                position: SectionPosition {
                    file: file.to_path_buf(),
                    byte_offset: next_offset,
                    line_count: 0,
                },
                lines: Vec::new(),
            });
        } else if let Some(current) = out.last_mut() {
            current.position.line_count += 1;
            if !exclude(&current.name) {
                if let Some(c) = content_of(raw) {
                    current.lines.push(c.to_string());
                }
            }
        }
        offset = next_offset;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize_dashes_case_and_spacing() {
        assert_eq!(normalize_section_name("--STRUCTURE ELEMENTS"), "STRUCTURE ELEMENTS");
        assert_eq!(
            normalize_section_name("-------------io/runtime   vtk output"),
            "IO/RUNTIME VTK OUTPUT"
        );
        assert_eq!(section_header("  // --NOT A HEADER"), None);
        assert_eq!(section_header("-1.0 2.0"), None);
        assert_eq!(section_header("----MATERIALS // mats"), Some("MATERIALS".into()));
    }

    #[test]
    fn comments_are_stripped_before_trimming() {
        assert_eq!(content_of("  KEY 1 // note"), Some("KEY 1"));
        assert_eq!(content_of("   // only a comment"), None);
        assert_eq!(content_of("\t  \r"), None);
    }

    #[test]
    fn scan_records_offsets_and_raw_line_counts() {
        let text = "title\n--A\nx 1\n\n// c\n--B ELEMENTS\n1 E\n2 E\n";
        let s = scan_sections(std::path::Path::new("deck.dat"), text, |n| n.ends_with("ELEMENTS"));
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].name, "A");
        assert_eq!(s[0].lines, vec!["x 1".to_string()]);
        assert_eq!(s[0].position.line_count, 3);
        assert_eq!(s[1].name, "B ELEMENTS");
        assert!(s[1].lines.is_empty());
        assert_eq!(s[1].position.line_count, 2);
        assert_eq!(&text[s[1].position.byte_offset as usize..], "1 E\n2 E\n");
    }

    #[test]
    fn in_memory_lines_skip_blank_entries() {
        let buf = InputBuffer::from_text("a\n\nb".into());
        let mut idx = SectionIndex::default();
        idx.insert("S".into(), SectionSource::InMemory { start: 0, end: 3 })
            .expect("insert");
        let got: Vec<_> = idx
            .lines(&buf, "S")
            .collect::<Result<Vec<_>, _>>()
            .expect("lines");
        assert_eq!(got, vec!["a", "b"]);
        assert!(idx.insert("S".into(), SectionSource::InMemory { start: 0, end: 0 }).is_err());
        assert_eq!(idx.lines(&buf, "MISSING").count(), 0);
    }
}
