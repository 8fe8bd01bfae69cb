//! # HashSmith
//!
//! A family of **SwissTable-style**, open-addressing hash tables: fingerprinted
//! control bytes, SWAR 8-slot group probing, and triangular probing shared
//! between a single-threaded engine and a lock-free, cooperative-resize
//! concurrent engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    hash (H1 / H2 mixer)                    │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │ selects starting group / fingerprint
//! ┌───────────────────────────▼───────────────────────────────┐
//! │              group (SWAR control-word scanner)             │
//! └──────────────┬──────────────────────────────┬─────────────┘
//!                │                              │
//! ┌──────────────▼─────────────┐  ┌─────────────▼──────────────┐
//! │  single::HashSmithMap      │  │  concurrent::               │
//! │  (exclusive-owner engine)  │  │  ConcurrentHashSmithMap      │
//! │  tombstone + rehash        │  │  (lock-free, cooperative     │
//! │                            │  │   resize)                    │
//! └─────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`hash`] | Component A — MurmurHash3-style mixer, H1/H2 split |
//! | [`group`] | Components B+C — slot-group layout constants, SWAR scanner |
//! | [`control`] | Control-byte constants and classification helpers |
//! | [`single`] | Component D — single-threaded engine (`HashSmithMap`) |
//! | [`concurrent`] | Component E — lock-free engine (`ConcurrentHashSmithMap`) |
//! | [`map`] | Component F's shared mapping contract (`HashSmithView`) + `MapError` |
//!
//! ## Key Features
//!
//! - **SWAR group scanning** — eight control bytes packed into one 64-bit
//!   word, scanned branch-free for fingerprint matches and empty lanes.
//! - **Triangular probing** — a power-of-two group count guarantees every
//!   group is visited exactly once before the sequence repeats.
//! - **Tombstone accounting** — the single-threaded engine reuses deleted
//!   slots and runs a same-capacity rehash once tombstones dominate live
//!   entries, so delete-heavy workloads never grow capacity unboundedly.
//! - **Cooperative lock-free resize** — the concurrent engine never blocks a
//!   caller on a mutex; one thread wins the right to grow the table while
//!   others spin-wait or help via retry, with per-slot freeze (MOVED) and
//!   per-value boxing (Prime) markers guaranteeing no lost updates.
//!
//! ## Quick Start
//!
//! ```rust
//! use hashsmith::single::HashSmithMap;
//!
//! let mut map = HashSmithMap::new();
//! map.put("a", 1);
//! assert_eq!(map.get(&"a"), Some(&1));
//! assert_eq!(map.remove(&"a"), Some(1));
//! assert_eq!(map.get(&"a"), None);
//! ```
//!
//! ```rust
//! use hashsmith::concurrent::ConcurrentHashSmithMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentHashSmithMap::new());
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..1_000 {
//!                 map.put(t * 1_000 + i, i);
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(map.len(), 4_000);
//! ```

#![allow(dead_code)]
#![forbid(unsafe_op_in_unsafe_fn)]

pub mod concurrent;
pub mod control;
pub mod group;
pub mod hash;
pub mod map;
pub mod single;
