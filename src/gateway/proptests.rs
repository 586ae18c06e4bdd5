//! Property-based tests for replay chunking
//!
//! The replay path re-slices an arbitrary stored result; slicing must be
//! lossless, ordered, and bounded for any text and any slice size.

use super::dispatcher::chunk_by_chars;
use proptest::prelude::*;

proptest! {
    #[test]
    fn chunks_reassemble_to_input(text in "\\PC{0,300}", size in 1usize..200) {
        let chunks = chunk_by_chars(&text, size);
        prop_assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunks_respect_size_bound(text in "\\PC{0,300}", size in 1usize..200) {
        for chunk in chunk_by_chars(&text, size) {
            prop_assert!(chunk.chars().count() <= size);
        }
    }

    #[test]
    fn chunk_count_is_ceiling_division(text in "\\PC{0,300}", size in 1usize..200) {
        let chars = text.chars().count();
        let expected = chars.div_ceil(size);
        prop_assert_eq!(chunk_by_chars(&text, size).len(), expected);
    }

    #[test]
    fn all_chunks_but_last_are_full(text in "\\PC{1,300}", size in 1usize..200) {
        let chunks = chunk_by_chars(&text, size);
        for chunk in &chunks[..chunks.len() - 1] {
            prop_assert_eq!(chunk.chars().count(), size);
        }
    }
}
