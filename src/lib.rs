//! irdex - a small inverted-index search engine for document trees.
//!
//! irdex tokenizes every file under a directory into per-word posting lists
//! kept in two [redb](https://github.com/cberner/redb) stores (document
//! names and word postings), then answers exact-word, wildcard and boolean
//! field queries against them with frequency ranking and pagination.
//!
//! # Quick start
//!
//! ```no_run
//! use irdex::{DataDir, IndexConfig, IndexSession, Operation, QueryEngine, Store};
//! use irdex::store::StoreKind;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let names = Store::open(&data_dir.names_db(), StoreKind::Names, 1000, false).unwrap();
//! let words = Store::open(&data_dir.words_db(), StoreKind::Words, 1000, false).unwrap();
//!
//! let config = IndexConfig::default();
//! let mut session = IndexSession::open(&names, &words, &config).unwrap();
//! let events = irdex::walker::walk(std::path::Path::new("docs")).unwrap();
//! session.run(Operation::Add, events, false).unwrap();
//! drop(session);
//!
//! let engine = QueryEngine::open(&names, &words).unwrap();
//! let page = irdex::search::execute_search(&engine, "rust and not python", 1, 10)
//!     .unwrap();
//! for hit in &page.hits {
//!     println!("{}. {}", hit.rank, hit.hit.filename);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod expression;
pub mod filter;
pub mod indexer;
pub mod pagination;
pub mod pattern;
pub mod posting;
pub mod query;
pub mod search;
pub mod store;
pub mod tokenizer;
pub mod walker;

pub use config::IndexConfig;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use expression::{EvalError, Expression, ExpressionContext};
pub use indexer::{IndexReport, IndexSession, Operation};
pub use pattern::{MatchFlags, MatchKind, Matcher};
pub use query::{QueryEngine, QueryResults, WeightedResult};
pub use store::Store;
