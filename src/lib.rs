//! # Course RAG
//!
//! Retrieval-augmented question answering over course materials.
//!
//! Course documents are segmented into overlapping units, embedded, and
//! stored in an index. A query runs a bounded tool-calling loop against a
//! chat completion endpoint; the model may call `search_course_content`,
//! whose results ground the final answer. Short per-session history carries
//! follow-up questions.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────────┐
//! │ Documents │──▶│ Segment  │──▶│ Index         │
//! │ txt/pdf/  │   │ + Embed  │   │ memory/SQLite │
//! │ docx      │   └──────────┘   └──────┬────────┘
//! └───────────┘                         │
//!                 ┌──────────┐   ┌──────┴────────┐
//!  query ────────▶│Generator │◀─▶│ Tool Registry │
//!                 │  loop    │   └───────────────┘
//!                 └────┬─────┘
//!                      ▼
//!              answer + sources + session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`segment`] | Sentence-aware segmentation |
//! | [`document`] | Course document parsing |
//! | [`extract`] | PDF / DOCX text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector storage backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Semantic search and course resolution |
//! | [`tools`] | Tool trait, registry, and the course search tool |
//! | [`llm`] | Chat completion client |
//! | [`generator`] | Bounded tool-calling loop |
//! | [`session`] | Per-conversation memory |
//! | [`rag`] | Orchestrator |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generator;
pub mod index;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod segment;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;
