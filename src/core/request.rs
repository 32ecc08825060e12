//! Read requests and reader options.

use std::fmt;
use std::sync::Arc;

/// Caller-supplied abort check, polled between parts, levels and trees.
pub type AbortCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// One piece read: which step and which of `num_pieces` pieces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub step: usize,
    pub piece: usize,
    pub num_pieces: usize,
    /// Sub-extent of an image; `None` derives it from the piece.
    pub update_extent: Option<[i64; 6]>,
    /// Re-read geometry even if the cached mesh could be reused.
    pub force_geometry: bool,
}

impl Default for ReadRequest {
    fn default() -> Self {
        Self {
            step: 0,
            piece: 0,
            num_pieces: 1,
            update_extent: None,
            force_geometry: false,
        }
    }
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_step(step: usize) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn with_piece(mut self, piece: usize, num_pieces: usize) -> Self {
        self.piece = piece;
        self.num_pieces = num_pieces.max(1);
        self
    }

    pub fn with_extent(mut self, extent: [i64; 6]) -> Self {
        self.update_extent = Some(extent);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_geometry = true;
        self
    }
}

/// Reader configuration.
#[derive(Clone)]
pub struct ReaderOptions {
    /// Promote isolated array failures to piece failures.
    pub strict: bool,
    /// Reuse geometry between steps when counts are unchanged.
    pub use_cache: bool,
    /// Gather file parts round-robin into the requested piece.
    pub merge_parts: bool,
    /// Levels to read; 0 reads all.
    pub max_amr_level: usize,
    /// Tree depth limit; `None` reads all depths.
    pub max_tree_depth: Option<usize>,
    pub use_mmap: bool,
    pub abort: Option<AbortCheck>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            strict: false,
            use_cache: true,
            merge_parts: true,
            max_amr_level: 0,
            max_tree_depth: None,
            use_mmap: true,
            abort: None,
        }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("strict", &self.strict)
            .field("use_cache", &self.use_cache)
            .field("merge_parts", &self.merge_parts)
            .field("max_amr_level", &self.max_amr_level)
            .field("max_tree_depth", &self.max_tree_depth)
            .field("use_mmap", &self.use_mmap)
            .field("abort", &self.abort.is_some())
            .finish()
    }
}

impl ReaderOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn merge_parts(mut self, merge: bool) -> Self {
        self.merge_parts = merge;
        self
    }

    pub fn max_amr_level(mut self, level: usize) -> Self {
        self.max_amr_level = level;
        self
    }

    pub fn max_tree_depth(mut self, depth: Option<usize>) -> Self {
        self.max_tree_depth = depth;
        self
    }

    pub fn use_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn abort_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.abort = Some(Arc::new(check));
        self
    }

    /// Poll the abort check.
    #[inline]
    pub fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|f| f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_request_builder() {
        let r = ReadRequest::at_step(3).with_piece(1, 0);
        assert_eq!(r.step, 3);
        assert_eq!(r.num_pieces, 1);
        assert!(!r.force_geometry);
        assert!(r.forced().force_geometry);
    }

    #[test]
    fn test_abort_check() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&flag);
        let opts = ReaderOptions::default().abort_check(move || f.load(Ordering::Relaxed));
        assert!(!opts.aborted());
        flag.store(true, Ordering::Relaxed);
        assert!(opts.aborted());
        assert!(!ReaderOptions::default().aborted());
    }
}
