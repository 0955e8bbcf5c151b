//! docwell - a local passage retrieval engine for grounding chat answers.
//!
//! docwell turns a folder of CSV, PDF, markdown and text files into a dense
//! vector index and returns the passages closest to a free-text query.
//! Vectors come from a [ColBERT](https://github.com/stanford-futuredata/ColBERT)
//! model, mean-pooled into one embedding per chunk; search is exact
//! nearest-neighbour by squared Euclidean distance.
//!
//! # Quick start
//!
//! ```no_run
//! use docwell::{ColbertEmbedder, ModelManager, Retriever, RetrieverConfig};
//!
//! let config = RetrieverConfig::new("data", "db");
//! let embedder = ColbertEmbedder::new(ModelManager::new());
//! let mut retriever = Retriever::new(config, Box::new(embedder));
//! retriever.load_or_build(false).unwrap();
//!
//! for passage in retriever.search("How do I switch on studio 7?", 5).unwrap() {
//!     println!("{passage}");
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod loader;
pub mod mcp;
pub mod metadata;
pub mod model_manager;
pub mod retriever;
pub mod tokens;
pub mod vector_index;

pub use chunking::Chunk;
pub use config::RetrieverConfig;
pub use embedding::{ColbertEmbedder, Embedder};
pub use error::{Error, Result};
pub use metadata::MetadataStore;
pub use model_manager::ModelManager;
pub use retriever::{Passage, Retriever};
pub use vector_index::FlatIndex;
