use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{doc, Index, IndexReader, TantivyDocument};
use tracing::debug;

use cardex_core::types::{CardRecord, SearchHit, SourceKind};
use cardex_core::{Error, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// Candidates fetched beyond `top_k` so that equal-score ties can be
/// re-broken by insertion order before truncation.
const OVERSAMPLE: usize = 4;

/// In-memory BM25 index over the `text` field of the catalog.
///
/// The index owns its own copy of the corpus and is rebuilt as a whole by
/// [`build`](LexicalIndex::build) / [`refresh`](LexicalIndex::refresh); the
/// invalidation trigger is any change to the record set, which in this
/// pipeline means every (re)index run. There is no per-query rebuild.
///
/// Determinism: a single writer commits once, and query results are
/// oversampled then stably re-sorted by `(score desc, insertion ordinal
/// asc)`, so an identical corpus and query always yield the identical
/// ordering, with ties resolved first-seen-first.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    id_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
    ordinal_field: tantivy::schema::Field,
    doc_count: usize,
}

impl LexicalIndex {
    /// Build a fresh index over `records`, in input order.
    pub fn build(records: &[CardRecord]) -> Result<Self> {
        let schema = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizer(&index);

        let id_field = schema.get_field("id").map_err(Error::other)?;
        let text_field = schema.get_field("text").map_err(Error::other)?;
        let ordinal_field = schema.get_field("ordinal").map_err(Error::other)?;

        let mut writer = index.writer(50_000_000).map_err(Error::other)?;
        for (ordinal, record) in records.iter().enumerate() {
            writer
                .add_document(doc!(
                    id_field => record.id.clone(),
                    text_field => record.text.clone(),
                    ordinal_field => ordinal as u64,
                ))
                .map_err(Error::other)?;
        }
        writer.commit().map_err(Error::other)?;
        let reader = index.reader().map_err(Error::other)?;
        debug!(records = records.len(), "lexical index built");

        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
            ordinal_field,
            doc_count: records.len(),
        })
    }

    /// Replace the corpus wholesale. Call whenever the record set changes.
    pub fn refresh(&mut self, records: &[CardRecord]) -> Result<()> {
        *self = Self::build(records)?;
        Ok(())
    }

    /// Top `top_k` records for `text` by BM25 score, best-first.
    ///
    /// An empty or stop-word-only query yields an empty hit list; rejecting
    /// empty query text outright is the query engine's job.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if text.trim().is_empty() || top_k == 0 || self.doc_count == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        // Free text may contain characters the query grammar reserves.
        let (query, _parse_errors) = parser.parse_query_lenient(text);

        let fetch = top_k.saturating_mul(OVERSAMPLE);
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(fetch))
            .map_err(Error::other)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let stored: TantivyDocument = searcher.doc(addr).map_err(Error::other)?;
            let id = stored
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let ordinal = stored
                .get_first(self.ordinal_field)
                .and_then(|v| v.as_u64())
                .unwrap_or(u64::MAX);
            hits.push((score, ordinal, id));
        }
        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(score, _, id)| SearchHit {
                id,
                score,
                source: SourceKind::Lexical,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }
}
