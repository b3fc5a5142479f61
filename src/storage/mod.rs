//! Storage Layer
//!
//! Typed values, the sharded keyspace with lazy expiry, the registry of
//! numbered databases and the background sweeper.
//!
//! ```text
//!        ┌───────────────────── Databases ─────────────────────┐
//!        │  db 0   db 1   ...   db N-1          admin          │
//!        │  ┌───┐  ┌───┐        ┌───┐           ┌───┐          │
//!        │  │64 │  │64 │        │64 │           │64 │ channels │
//!        │  │sh.│  │sh.│        │sh.│           │sh.│ sessions │
//!        │  └───┘  └───┘        └───┘           └───┘ role     │
//!        └──────────────────────────▲──────────────────────────┘
//!                                   │ Database::sweep
//!                     ┌─────────────┴─────────────┐
//!                     │       ExpirySweeper       │
//!                     │  (background Tokio task)  │
//!                     └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{Databases, Entry, Value};
//! use bytes::Bytes;
//!
//! let databases = Databases::new(16);
//! let db = databases.select(0).unwrap();
//!
//! db.put(Bytes::from("name"), Entry::string("Ariz"));
//! assert_eq!(db.get_value(b"name"), Some(Value::String(Bytes::from("Ariz"))));
//! assert!(databases.select(16).is_err());
//! ```

pub mod database;
pub mod expiry;
pub mod pattern;
pub mod registry;
pub mod value;

pub use database::{Database, DatabaseStats, Entry, Rename, Write};
pub use expiry::{sweep_all, ExpiryConfig, ExpirySweeper};
pub use pattern::glob_match;
pub use registry::{Databases, DEFAULT_DATABASES};
pub use value::{ScoreBound, SortedSet, Value};
