//! Context assembly for grounded answers.
//!
//! Renders the documents returned by the store into a single text block
//! injected into the reasoning prompt. The output is opaque text passed
//! verbatim to the model — document content is not escaped or sanitized,
//! so retrieved text can steer the prompt (known limitation).

use crate::types::Document;

/// Separator between document blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Render an ordered document sequence into one context block.
///
/// Each document becomes a `**Metadata**` / `**Content**` pair; blocks are
/// joined with a blank line. An empty sequence yields an empty string.
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(format_block)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn format_block(document: &Document) -> String {
    let metadata = document
        .metadata
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "**Metadata**: {{{metadata}}}\n**Content**: {}",
        document.content
    )
}
