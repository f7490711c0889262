use std::fmt;
use std::str::FromStr;

use crate::common::{DbError, FrameId, Timestamp};

/// Page replacement policy used when the buffer pool must evict a frame.
///
/// - `Lru` evicts the unpinned frame whose last access is the oldest.
/// - `Mru` evicts the unpinned frame whose last access is the most recent.
///
/// When two candidates have the same access time the lower frame index wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Mru,
}

impl ReplacementPolicy {
    /// Picks a victim among `(frame, last_access)` candidates, which must
    /// all be evictable. Returns None if there are no candidates.
    pub fn pick_victim<I>(&self, candidates: I) -> Option<FrameId>
    where
        I: IntoIterator<Item = (FrameId, Timestamp)>,
    {
        let mut victim: Option<(FrameId, Timestamp)> = None;

        for (frame_id, last_access) in candidates {
            let replace = match victim {
                None => true,
                Some((v_id, v_ts)) => {
                    let better = match self {
                        ReplacementPolicy::Lru => last_access < v_ts,
                        ReplacementPolicy::Mru => last_access > v_ts,
                    };
                    better || (last_access == v_ts && frame_id < v_id)
                }
            };
            if replace {
                victim = Some((frame_id, last_access));
            }
        }

        victim.map(|(frame_id, _)| frame_id)
    }
}

impl FromStr for ReplacementPolicy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LRU" => Ok(ReplacementPolicy::Lru),
            "MRU" => Ok(ReplacementPolicy::Mru),
            other => Err(DbError::Config(format!(
                "unknown replacement policy '{}', expected LRU or MRU",
                other
            ))),
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Lru => write!(f, "LRU"),
            ReplacementPolicy::Mru => write!(f, "MRU"),
        }
    }
}
