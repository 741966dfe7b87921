#![doc = "repo-scribe-core: core logic library for repo-scribe."]

//! This crate contains the pipelines, data models and service seams of
//! repo-scribe. Network clients live in the `repo-scribe` CLI crate and plug in
//! through the traits in [`contract`].
//!
//! # Pipelines
//! - [`ingest`]: materialize a repository revision and document every file.
//! - [`diff_ingest`]: document the files a single commit touched and open a
//!   pull request with per-file summaries.
//!
//! # Usage
//! Add this as a dependency for everything that drives a pipeline run; build a
//! [`config::PipelineConfig`] and a [`contract::Services`] bundle once and pass
//! them by reference.

pub mod config;
pub mod contract;
pub mod diff_ingest;
pub mod docs;
pub mod error;
pub mod filter;
pub mod identity;
pub mod indexer;
pub mod ingest;
pub mod materialize;
pub mod prompts;
pub mod push;
pub mod qa;
pub mod repository;
