//! Speaker identity from the filename convention `<name>_<speaker>_*.ext`:
//! underscore-delimited, integer token at position 1. Anything else means
//! "no speaker conditioning", never an error.

use std::collections::HashMap;
use std::path::Path;

use crate::error::PrepError;

/// Extract the raw speaker token, canonicalized through integer parsing
/// (`"007"` and `"7"` are the same speaker).
pub fn parse_speaker_token(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let token = stem.split('_').nth(1)?;
    let value: i64 = token.parse().ok()?;
    Some(value.to_string())
}

/// Raw token -> dense id, first-seen order, append-only.
///
/// Built single-threaded over the full file listing before worker fan-out so
/// every worker sees one consistent numbering.
#[derive(Debug, Default)]
pub struct SpeakerMap {
    ids: HashMap<String, u32>,
}

impl SpeakerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the mapping from a filename listing, in listing order.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut map = Self::new();
        for path in paths {
            if let Some(token) = parse_speaker_token(path) {
                map.resolve(&token);
            }
        }
        map
    }

    /// Id for a raw token, assigning the next sequential id on first sight.
    pub fn resolve(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.ids.get(token) {
            return id;
        }
        let id = self.ids.len() as u32;
        tracing::info!(token, id, "speaker token mapped");
        self.ids.insert(token.to_string(), id);
        id
    }

    /// Lookup without assignment, for the read-only per-worker view.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Persist the mapping as JSON next to the run's other artifacts.
    pub fn save(&self, path: &Path) -> Result<(), PrepError> {
        let json = serde_json::to_string_pretty(&self.ids)
            .map_err(|e| PrepError::runtime("serialize speaker mapping", e))?;
        std::fs::write(path, json).map_err(|e| PrepError::io("write speaker mapping", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_integer_token_at_position_one() {
        assert_eq!(
            parse_speaker_token(Path::new("/data/song_7_take3.wav")),
            Some("7".to_string())
        );
        assert_eq!(
            parse_speaker_token(Path::new("clip_007.flac")),
            Some("7".to_string())
        );
    }

    #[test]
    fn non_numeric_or_missing_token_is_none() {
        assert_eq!(parse_speaker_token(Path::new("song_alice_x.wav")), None);
        assert_eq!(parse_speaker_token(Path::new("nodelimiter.wav")), None);
        assert_eq!(parse_speaker_token(Path::new("")), None);
    }

    #[test]
    fn ids_follow_first_seen_order() {
        let mut map = SpeakerMap::new();
        let seen: Vec<u32> = ["7", "3", "7", "9"].iter().map(|t| map.resolve(t)).collect();
        assert_eq!(seen, vec![0, 1, 0, 2]);
        assert_eq!(map.get("7"), Some(0));
        assert_eq!(map.get("3"), Some(1));
        assert_eq!(map.get("9"), Some(2));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn from_paths_skips_unparseable_names() {
        let paths: Vec<PathBuf> = ["a_5_x.wav", "b_nospk.wav", "c_2.wav", "d_5_y.wav"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let map = SpeakerMap::from_paths(paths.iter().map(|p| p.as_path()));
        assert_eq!(map.get("5"), Some(0));
        assert_eq!(map.get("2"), Some(1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn save_round_trips_through_json() {
        let mut map = SpeakerMap::new();
        map.resolve("7");
        map.resolve("3");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speaker_mapping.json");
        map.save(&path).unwrap();

        let loaded: std::collections::HashMap<String, u32> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.get("7"), Some(&0));
        assert_eq!(loaded.get("3"), Some(&1));
    }
}
