//! Chunker configuration.
//!
//! Options mirror the chunking half of the bridge configuration surface.
//! The decoration reserve is derived from the widest navigation header and
//! part footer the annotator can emit, so splitting against the body budget
//! keeps every decorated chunk within `max_chunk_size`.

use super::annotate::{CONTINUATION_MARKER, navigation_footer, navigation_header};
use crate::core::{ChunkType, DECORATION_SEPARATOR};
use crate::error::{ChunkingError, Result};
use crate::io::char_len;

/// Default maximum decorated chunk size in chars.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 3800;

/// Largest batch the navigation headers are sized for.
pub const MAX_PARTS: usize = 99_999;

/// Smallest body budget left after decoration.
pub const MIN_BODY_BUDGET: usize = 32;

/// Smallest code payload a re-fenced piece may carry.
pub const MIN_FENCE_PAYLOAD: usize = 16;

/// Options controlling how messages are split and decorated.
///
/// # Examples
///
/// ```
/// use chunk_relay::chunking::ChunkOptions;
///
/// let options = ChunkOptions::new()
///     .max_chunk_size(1000)
///     .add_navigation(false);
/// assert!(options.validate().is_ok());
/// assert!(options.body_budget() < 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Maximum decorated chunk size in chars.
    pub max_chunk_size: usize,
    /// Never cut fenced code blocks except along their lines, re-fencing each piece.
    pub preserve_code_blocks: bool,
    /// Never break inside inline markdown spans at sentence or word level.
    pub preserve_markdown: bool,
    /// Decorate each chunk of a multi-chunk batch with a "Part i of N"
    /// header and a part footer.
    pub add_navigation: bool,
    /// Attach a short preview of the message to the first chunk.
    pub add_previews: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkOptions {
    /// Creates options with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            preserve_code_blocks: true,
            preserve_markdown: true,
            add_navigation: true,
            add_previews: true,
        }
    }

    /// Sets the maximum decorated chunk size.
    #[must_use]
    pub const fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Sets code block preservation.
    #[must_use]
    pub const fn preserve_code_blocks(mut self, preserve: bool) -> Self {
        self.preserve_code_blocks = preserve;
        self
    }

    /// Sets inline markdown preservation.
    #[must_use]
    pub const fn preserve_markdown(mut self, preserve: bool) -> Self {
        self.preserve_markdown = preserve;
        self
    }

    /// Sets navigation headers.
    #[must_use]
    pub const fn add_navigation(mut self, add: bool) -> Self {
        self.add_navigation = add;
        self
    }

    /// Sets first-chunk previews.
    #[must_use]
    pub const fn add_previews(mut self, add: bool) -> Self {
        self.add_previews = add;
        self
    }

    /// Returns the chars reserved for navigation, continuation and footer
    /// decoration.
    ///
    /// A body never exceeds `max_chunk_size` chars, so the footer is
    /// measured with that length and the widest content type name.
    #[must_use]
    pub fn decoration_reserve(&self) -> usize {
        let separator = char_len(DECORATION_SEPARATOR);
        let continuation = char_len(CONTINUATION_MARKER) + separator;
        if !self.add_navigation {
            return continuation;
        }
        let header = char_len(&navigation_header(MAX_PARTS, MAX_PARTS));
        let footer = ChunkType::all()
            .into_iter()
            .map(|t| char_len(&navigation_footer(MAX_PARTS, MAX_PARTS, self.max_chunk_size, t)))
            .max()
            .unwrap_or_default();
        continuation + header + separator + footer + separator
    }

    /// Returns the budget available to a chunk body.
    #[must_use]
    pub fn body_budget(&self) -> usize {
        self.max_chunk_size.saturating_sub(self.decoration_reserve())
    }

    /// Returns the smallest `max_chunk_size` these options accept.
    #[must_use]
    pub fn min_chunk_size(&self) -> usize {
        self.decoration_reserve() + MIN_BODY_BUDGET
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::ChunkTooSmall`] if decoration would leave
    /// less than [`MIN_BODY_BUDGET`] chars for the body.
    pub fn validate(&self) -> Result<()> {
        let min = self.min_chunk_size();
        if self.max_chunk_size < min {
            return Err(ChunkingError::ChunkTooSmall {
                size: self.max_chunk_size,
                min,
            }
            .into());
        }
        Ok(())
    }
}
