//! Deterministic sliding-window chunking (§4.4). Given the same inputs, the
//! set of chunks produced is identical in count, order, and IDs -- the
//! invariant the whole downstream retrieval/extraction pipeline leans on.

use crate::determinism::run_id::sha256_hex;
use crate::entities::Chunk;
use crate::error::{CoreError, CoreResult};

const DEFAULT_TENANT: &str = "default";

fn chunk_id(document_hash: &str, tenant_id: &str, page_number: i64, start: usize, end: usize) -> String {
    let seed = if tenant_id == DEFAULT_TENANT {
        document_hash.to_string()
    } else {
        format!("{document_hash}:{tenant_id}")
    };
    sha256_hex(format!("{seed}:{page_number}:{start}:{end}").as_bytes())
}

fn lexical_side_index(text: &str) -> String {
    text.to_ascii_lowercase()
}

/// Builds the chunk set for one page. `size` and `overlap` are in
/// characters. An empty page still yields exactly one zero-length chunk so
/// downstream queries observe every page that exists.
pub fn build_page_chunks(
    document_id: i64,
    document_hash: &str,
    tenant_id: &str,
    page_number: i64,
    text: &str,
    size: usize,
    overlap: usize,
) -> CoreResult<Vec<Chunk>> {
    if overlap >= size {
        return Err(CoreError::InvalidInput(format!(
            "chunk overlap ({overlap}) must be less than size ({size})"
        )));
    }
    let step = size - overlap;
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len == 0 {
        let id = chunk_id(document_hash, tenant_id, page_number, 0, 0);
        return Ok(vec![Chunk {
            document_id,
            chunk_id: id,
            page_number,
            start_offset: 0,
            end_offset: 0,
            text: String::new(),
            content_tsv: String::new(),
        }]);
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(len);
        let window: String = chars[start..end].iter().collect();
        let id = chunk_id(document_hash, tenant_id, page_number, start, end);
        chunks.push(Chunk {
            document_id,
            chunk_id: id,
            page_number,
            start_offset: start as i64,
            end_offset: end as i64,
            content_tsv: lexical_side_index(&window),
            text: window,
        });
        if start + size >= len {
            break;
        }
        start += step;
    }
    Ok(chunks)
}
