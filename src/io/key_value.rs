//! `KEY VALUE` parameter lines.

use crate::algs::communicator::Communicator;
use crate::config::ParameterList;
use crate::deck_error::DeckError;
use crate::io::reader::DeckReader;
use crate::io::section_store::normalize_section_name;

/// Split a content line into key and value.
///
/// A line containing `" = "` is split at its first occurrence, so both key
/// and value may contain spaces. Otherwise the split is at the first
/// whitespace run. Both sides are trimmed and must be non-empty.
pub fn read_key_value(line: &str) -> Result<(String, String), DeckError> {
    let fail = || DeckError::KeyValue {
        line: line.to_string(),
    };
    let (key, value) = match line.find(" = ") {
        Some(pos) => (&line[..pos], &line[pos + 3..]),
        None => {
            let trimmed = line.trim();
            let pos = trimmed.find(char::is_whitespace).ok_or_else(fail)?;
            (&trimmed[..pos], &trimmed[pos..])
        }
    };
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return Err(fail());
    }
    Ok((key.to_string(), value.to_string()))
}

/// Read every line of section `name` as a key/value pair into the sublist
/// addressed by the section name. Returns whether the section has content.
pub fn read_parameters_in_section<C: Communicator>(
    reader: &DeckReader<C>,
    name: &str,
    list: &mut ParameterList,
) -> Result<bool, DeckError> {
    let name = normalize_section_name(name);
    if !reader.has_section(&name) {
        // an empty section is still not reported unknown
        reader.mark_used(&name);
        return Ok(false);
    }
    let sublist = list.sublist_at_mut(&name);
    for line in reader.lines_in_section(&name) {
        let (key, value) = read_key_value(&line?)?;
        if sublist.contains(&key) {
            return Err(DeckError::DuplicateParameter { section: name, key });
        }
        sublist.set(key, value);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn whitespace_and_equals_separators() {
        assert_eq!(
            read_key_value("FOO   bar baz").expect("ws"),
            ("FOO".into(), "bar baz".into())
        );
        assert_eq!(
            read_key_value("FOO = bar baz").expect("eq"),
            ("FOO".into(), "bar baz".into())
        );
        assert_eq!(
            read_key_value("Status Test = xml/status.xml").expect("spaced key"),
            ("Status Test".into(), "xml/status.xml".into())
        );
        assert!(read_key_value("FOO").is_err());
        assert!(read_key_value("FOO = ").is_err());
    }

    #[test]
    fn empty_sections_count_as_used_without_a_sublist() {
        let dir = std::env::temp_dir().join(format!("mesh_deck_kv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("deck.dat");
        std::fs::write(&path, "--SOLVER 1\n--IO\nOUTPUT_BIN Yes\n").expect("write deck");
        let reader = DeckReader::new(&path, crate::algs::communicator::NoComm, false).expect("reader");
        let mut list = ParameterList::new();
        assert!(!read_parameters_in_section(&reader, "SOLVER 1", &mut list).expect("empty"));
        assert!(read_parameters_in_section(&reader, "--IO", &mut list).expect("io"));
        assert!(list.sublist_at("SOLVER 1").is_none());
        assert_eq!(list.get_at::<String>("IO", "OUTPUT_BIN").expect("typed").as_deref(), Some("Yes"));
        assert!(reader.unknown_sections().is_empty());
    }

    proptest! {
        #[test]
        fn key_is_first_token(key in "[A-Z_]{1,12}", value in "[a-z0-9.]{1,8}( [a-z0-9.]{1,8}){0,3}") {
            let (k, v) = read_key_value(&format!("{key}  \t{value}")).expect("split");
            prop_assert_eq!(k, key);
            prop_assert_eq!(v, value);
        }
    }
}
