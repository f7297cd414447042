//! # Old Timer
//!
//! A retrieval-augmented chat service that answers baseball trivia in the
//! voice of a folksy "Old Timer" historian.
//!
//! ## Architecture
//!
//! ```text
//!  POST /api/chat
//!        │
//!        ▼
//! ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐
//! │  Validate  │──▶│  Embed   │──▶│ Retrieve  │──▶│  Generate  │──▶ { response }
//! │  message   │   │ (OpenAI) │   │(Pinecone) │   │  (OpenAI)  │
//! └────────────┘   └──────────┘   └───────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=... PINECONE_API_KEY=... PINECONE_INDEX=cubs-history
//! oldtimer check                                  # verify config and index
//! oldtimer ask "who was the best Cubs pitcher?"   # one-off answer
//! oldtimer serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env credentials, validation |
//! | [`logging`] | Tracing setup |
//! | [`error`] | Pipeline stages and error taxonomy |
//! | [`models`] | Request-scoped data types |
//! | [`validate`] | Input validation |
//! | [`http`] | Shared HTTP client and retry |
//! | [`embedding`] | Query embedding |
//! | [`retrieval`] | Vector index trait and context assembly |
//! | [`pinecone`] | Pinecone index client |
//! | [`generation`] | Prompt building and answer generation |
//! | [`pipeline`] | Stage orchestration |
//! | [`server`] | HTTP server |

pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod http;
pub mod logging;
pub mod models;
pub mod pinecone;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod validate;
