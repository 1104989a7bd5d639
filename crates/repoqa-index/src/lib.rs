//! Code-aware indexing and retrieval.
//!
//! Write path: [`scanner`] finds candidate files, [`chunker`] splits each one
//! along definition boundaries found by [`boundary`], [`metadata`] attaches
//! provenance and a content fingerprint, and [`indexer`] reconciles the result
//! with what is already stored.
//!
//! Read path: [`intent`] picks a retrieval profile for a question and
//! [`retriever`] runs the similarity search.

pub mod boundary;
pub mod chunker;
pub(crate) mod context;
pub mod error;
pub mod indexer;
pub mod intent;
pub mod languages;
pub mod metadata;
pub mod retriever;
pub mod scanner;

pub use error::{IndexError, Result};
