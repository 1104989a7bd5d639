//! Embedding text generation.
//!
//! The vector is computed over the chunk prefixed with its provenance, so a
//! question such as "where is auth handled?" can match on the path even when
//! the code itself never names the concept. The stored `text` stays raw.

use crate::metadata::IndexedDocument;

#[must_use]
pub(crate) fn contextualize_for_embedding(doc: &IndexedDocument) -> String {
    let mut text = String::with_capacity(doc.chunk.text.len() + 96);

    text.push_str("# ");
    text.push_str(&doc.chunk.path);
    text.push('\n');

    text.push_str("# Language: ");
    text.push_str(&doc.language);
    text.push('\n');

    text.push_str("# Kind: ");
    text.push_str(doc.chunk.kind.as_str());
    text.push('\n');

    text.push_str(&doc.chunk.text);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Chunk, ChunkKind, SourceFile, assemble};

    fn sample() -> IndexedDocument {
        let file = SourceFile::new("src/auth/session.rs", "fn login() {}\n");
        let chunk = Chunk {
            path: file.path.clone(),
            kind: ChunkKind::Function,
            seq: 0,
            line_start: 1,
            line_end: 1,
            text: file.text.clone(),
        };
        assemble(chunk, &file)
    }

    #[test]
    fn header_lines_precede_code() {
        let text = contextualize_for_embedding(&sample());
        assert_eq!(
            text,
            "# src/auth/session.rs\n# Language: rust\n# Kind: function\nfn login() {}\n"
        );
    }

    #[test]
    fn stored_text_is_untouched() {
        let doc = sample();
        let _ = contextualize_for_embedding(&doc);
        assert_eq!(doc.chunk.text, "fn login() {}\n");
    }
}
