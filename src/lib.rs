//! # semdex
//!
//! An incremental semantic file indexer. semdex watches a directory tree,
//! detects changed files cheaply (size, mtime, content hash), chunks and
//! embeds their content, and serves cosine-similarity search over all
//! indexed chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐
//! │  Walk +  │──▶│   Extract,   │──▶│  Vector store    │
//! │  change  │   │ chunk, embed │   │ + file table     │
//! │ tracking │   └──────────────┘   │ + search index   │
//! └──────────┘                      └────────┬────────┘
//!                                            │
//!                                            ▼
//!                                   ┌─────────────────┐
//!                                   │  CLI (sdx):      │
//!                                   │  search, status  │
//!                                   └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sdx init                       # create the .semdex repository
//! sdx index .                    # index the tree (incremental)
//! sdx search "deployment notes"  # rank chunks by cosine similarity
//! sdx status                     # counts and storage summary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`repo`] | `.semdex` repository discovery and layout |
//! | [`error`] | Indexing error taxonomy |
//! | [`tracker`] | Change detection over the SQLite file table |
//! | [`extract`] | Content extraction (text, DOCX, PDF, images) |
//! | [`chunk`] | Text chunking strategies |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Durable per-file embedding storage |
//! | [`search_index`] | Combined in-memory similarity index |
//! | [`indexer`] | Orchestration and background jobs |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | Status and listing output |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod progress;
pub mod repo;
pub mod search_index;
pub mod stats;
pub mod tracker;
pub mod vector_store;
