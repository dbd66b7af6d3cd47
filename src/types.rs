use std::path::PathBuf;

/// A normalized chunk ready to be written, tagged with its provenance.
#[derive(Debug, Clone)]
pub struct ChunkTag {
    /// Index of the source file in the sorted input listing.
    pub idx0: usize,
    /// Within-file sequence index, one per emitted chunk.
    pub idx1: usize,
    /// Dense internal speaker id, when the filename carried one.
    pub speaker_id: Option<u32>,
}

impl ChunkTag {
    /// Output basename; the speaker field is omitted entirely when absent,
    /// and callers fix one scheme for the whole run.
    pub fn wav_name(&self) -> String {
        match self.speaker_id {
            Some(spk) => format!("{}_{}_{}.wav", self.idx0, self.idx1, spk),
            None => format!("{}_{}.wav", self.idx0, self.idx1),
        }
    }
}

/// Unit of idempotency for the pitch stage: an item is done only when both
/// output arrays exist.
#[derive(Debug, Clone)]
pub struct PathTriple {
    pub input: PathBuf,
    pub coarse_out: PathBuf,
    pub continuous_out: PathBuf,
}

impl PathTriple {
    pub fn is_done(&self) -> bool {
        self.coarse_out.exists() && self.continuous_out.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_name_with_and_without_speaker() {
        let tagged = ChunkTag {
            idx0: 3,
            idx1: 7,
            speaker_id: Some(2),
        };
        assert_eq!(tagged.wav_name(), "3_7_2.wav");

        let untagged = ChunkTag {
            idx0: 3,
            idx1: 7,
            speaker_id: None,
        };
        assert_eq!(untagged.wav_name(), "3_7.wav");
    }
}
