//! # rag-sentinel core
//!
//! Pure logic shared by the `rag-sentinel` service: data models, the
//! append-only [`VectorIndex`](index::VectorIndex), stable query identity,
//! and the prompt templates and reply parsers used to talk to the chat
//! model.
//!
//! This crate contains no tokio, networking, or filesystem dependencies.

pub mod embedding;
pub mod identity;
pub mod index;
pub mod models;
pub mod prompt;
