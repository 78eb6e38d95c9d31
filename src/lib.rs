//! # profile-sync
//!
//! Turns customer tag spreadsheets into per-customer documents and keeps a
//! Chroma collection in sync with them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ CSV rows │──▶│ normalize  │──▶│ handoff JSON │──▶│   sync   │──▶│  Chroma  │
//! └──────────┘   └────────────┘   └──────────────┘   └──────────┘   └────┬─────┘
//!                                                                        │
//!                                                   ┌──────────┐         │
//!                                                   │ retrieve │◀────────┘
//!                                                   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! psync normalize                       # data/user_rawdata.csv → data/chromadb_ready.json
//! psync sync                            # insert into 'user_info'
//! psync sample --limit 10               # read back a few records
//! psync find --where product_id=A --where product_info=main_features
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`normalize`] | CSV grouping, pivoting and boolean coercion |
//! | [`handoff`] | Handoff file read/write |
//! | [`store`] | Document store trait, Chroma client, in-memory store |
//! | [`embedding`] | Embedding providers |
//! | [`sync`] | Bulk insert of a handoff file |
//! | [`retrieve`] | Sample and filtered reads |
//! | [`flow`] | Conversational flow config validation |

pub mod config;
pub mod embedding;
pub mod flow;
pub mod handoff;
pub mod models;
pub mod normalize;
pub mod retrieve;
pub mod store;
pub mod sync;
