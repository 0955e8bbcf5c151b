//! The retrieval engine: builds or loads a snapshot, then answers queries.
//!
//! A [`Retriever`] starts unloaded. [`Retriever::load_or_build`] either
//! restores the persisted index and metadata or rebuilds both from the
//! input directory. Once loaded, [`Retriever::search`] maps a query to an
//! ordered list of passage texts.

use std::{collections::BTreeSet, path::Path};

use serde::Serialize;

use crate::{
    chunking::Chunk,
    config::RetrieverConfig,
    embedding::{self, Embedder},
    error::{Error, Result},
    loader,
    metadata::MetadataStore,
    vector_index::FlatIndex,
};

/// A passage returned by [`Retriever::search_passages`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    /// Position of the chunk in the index.
    pub position: usize,
    pub source: String,
    pub text: String,
    /// Squared distance to the query for direct hits; `None` for
    /// neighbours pulled in by window expansion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// An index and its metadata, positionally aligned.
#[derive(Debug)]
struct Snapshot {
    index: FlatIndex,
    metadata: MetadataStore,
}

pub struct Retriever {
    config: RetrieverConfig,
    embedder: Box<dyn Embedder>,
    snapshot: Option<Snapshot>,
}

impl Retriever {
    /// Create an unloaded retriever.
    pub fn new(config: RetrieverConfig, embedder: Box<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            snapshot: None,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of indexed chunks; zero while unloaded.
    pub fn len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.metadata.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the persisted snapshot, or build a fresh one.
    ///
    /// Unless `force_rebuild` is set, an existing index/metadata pair in the
    /// output directory is loaded as-is. Otherwise the input directory is
    /// chunked, embedded and indexed, and both artifacts are written before
    /// the retriever switches to the new state.
    pub fn load_or_build(&mut self, force_rebuild: bool) -> Result<()> {
        let index_path = self.config.index_path();
        let metadata_path = self.config.metadata_path();

        let snapshot = if !force_rebuild
            && index_path.is_file()
            && metadata_path.is_file()
        {
            tracing::info!(
                dir = %self.config.output_dir.display(),
                "loading existing index"
            );
            load_snapshot(&self.config)?
        } else {
            let snapshot = self.build()?;
            self.config.ensure_output_dir()?;
            save_snapshot(&self.config, &snapshot)?;
            tracing::info!(chunks = snapshot.metadata.len(), "index saved");
            snapshot
        };

        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn build(&self) -> Result<Snapshot> {
        tracing::info!(
            input = %self.config.input_dir.display(),
            target_chunk_tokens = self.config.target_chunk_tokens,
            "building index"
        );

        let counter = if self.config.target_chunk_tokens > 0 {
            self.embedder.token_counter()
        } else {
            crate::tokens::TokenCounter::Approximate
        };
        let chunks = loader::load_chunks(&self.config, &counter)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedding::embed_in_batches(
            self.embedder.as_ref(),
            &texts,
            self.config.batch_size,
        )?;

        let dimension = vectors.first().map_or(0, Vec::len);
        let mut index = FlatIndex::new(dimension);
        index.add(&vectors)?;

        let metadata: MetadataStore = chunks.into_iter().collect();
        Ok(Snapshot { index, metadata })
    }

    /// Return the text of the passages most relevant to `query`.
    ///
    /// With a window size of zero the passages are in relevance order.
    /// Otherwise each of the top `k` hits is widened by the window on both
    /// sides and the union is returned in index order.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_passages(query, k)?
            .into_iter()
            .map(|p| p.text)
            .collect())
    }

    /// Like [`Retriever::search`], with provenance for every passage.
    pub fn search_passages(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>> {
        let snapshot = self.snapshot.as_ref().ok_or(Error::NotLoaded)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Embedding("embedder returned no query vector".into())
            })?;

        // Padding slots are dropped below, so never ask for more than exist.
        let hits: Vec<(usize, f32)> = snapshot
            .index
            .search(&query_vector, k.min(snapshot.index.len()))?
            .into_iter()
            .filter_map(|n| n.position.map(|p| (p, n.distance)))
            .collect();

        let positions: Vec<usize> = if self.config.window_size > 0 {
            let hit_positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
            expand_window(
                &hit_positions,
                self.config.window_size,
                snapshot.metadata.len(),
            )
        } else {
            hits.iter().map(|h| h.0).collect()
        };

        positions
            .into_iter()
            .map(|position| {
                let Chunk { source, text } =
                    snapshot.metadata.get(position).cloned().ok_or_else(
                        || Error::CorruptSnapshot {
                            path: self.config.metadata_path(),
                            reason: format!(
                                "index position {position} has no metadata"
                            ),
                        },
                    )?;
                let distance = hits
                    .iter()
                    .find(|(p, _)| *p == position)
                    .map(|(_, d)| *d);
                Ok(Passage {
                    position,
                    source,
                    text,
                    distance,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field("chunks", &self.len())
            .finish_non_exhaustive()
    }
}

fn load_snapshot(config: &RetrieverConfig) -> Result<Snapshot> {
    let index = FlatIndex::load(&config.index_path())?;
    let metadata = MetadataStore::load(&config.metadata_path())?;

    if index.len() != metadata.len() {
        return Err(Error::CorruptSnapshot {
            path: config.output_dir.clone(),
            reason: format!(
                "index holds {} vectors but metadata has {} entries",
                index.len(),
                metadata.len()
            ),
        });
    }

    Ok(Snapshot { index, metadata })
}

/// Persist both artifacts so that a failure never leaves a new index next
/// to stale metadata.
///
/// Both files are first written to `*.tmp` siblings and then renamed into
/// place. If the metadata rename fails after the index was replaced, the
/// new index is removed so the next `load_or_build` rebuilds instead of
/// loading a mismatched pair.
fn save_snapshot(config: &RetrieverConfig, snapshot: &Snapshot) -> Result<()> {
    let index_path = config.index_path();
    let metadata_path = config.metadata_path();
    let index_tmp = index_path.with_extension("flat.tmp");
    let metadata_tmp = metadata_path.with_extension("json.tmp");

    let staged = snapshot
        .index
        .save(&index_tmp)
        .and_then(|()| snapshot.metadata.save(&metadata_tmp));
    if let Err(e) = staged {
        discard(&[&index_tmp, &metadata_tmp]);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&index_tmp, &index_path) {
        discard(&[&index_tmp, &metadata_tmp]);
        return Err(e.into());
    }
    if let Err(e) = std::fs::rename(&metadata_tmp, &metadata_path) {
        tracing::warn!(
            path = %metadata_path.display(),
            "metadata could not be replaced, removing new index"
        );
        discard(&[&index_path, &metadata_tmp]);
        return Err(e.into());
    }
    Ok(())
}

fn discard(paths: &[&Path]) {
    for path in paths {
        let _ = std::fs::remove_file(path);
    }
}

/// Widen every hit to `[hit - window, hit + window]`, clipped to
/// `[0, len - 1]`, and return the union in ascending order.
///
/// # Examples
///
/// ```
/// use docwell::retriever::expand_window;
///
/// assert_eq!(expand_window(&[2], 1, 5), vec![1, 2, 3]);
/// assert_eq!(expand_window(&[4, 0], 1, 5), vec![0, 1, 3, 4]);
/// ```
pub fn expand_window(hits: &[usize], window: usize, len: usize) -> Vec<usize> {
    let mut positions = BTreeSet::new();
    for &hit in hits {
        if hit >= len {
            continue;
        }
        let start = hit.saturating_sub(window);
        let end = hit.saturating_add(window).min(len - 1);
        positions.extend(start..=end);
    }
    positions.into_iter().collect()
}
