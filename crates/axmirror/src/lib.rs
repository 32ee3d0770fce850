//! axmirror: a cross-thread accessibility snapshot tree.
//!
//! This crate maintains a read-optimized, eventually-consistent mirror of
//! a live accessibility tree:
//!
//! - **Snapshot Tree**: the owner thread observes changes in the live
//!   tree, computes minimal diffs, and enqueues them under a single lock;
//!   the reader thread drains the queues atomically and serves all
//!   subsequent read queries lock-free from its private node map
//! - **Node Snapshots**: sparse property bags plus a packed flag word for
//!   the common boolean properties
//! - **Text Markers**: (tree, node, offset, affinity) positions in
//!   rendered text, comparable and walkable by character, word, sentence,
//!   line, and paragraph, entirely on the reader thread via cached text
//!   runs
//! - **Marker Ranges**: normalized marker pairs with intersection, string
//!   materialization, and geometry projection
//!
//! When a query needs data the snapshot doesn't carry (e.g. the frame of
//! a node whose geometry was never cached), the reader thread performs a
//! blocking round-trip to the owner thread through
//! [`axmirror_core::invocation`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use axmirror::id::NodeId;
//! use axmirror::live::StaticLiveTree;
//! use axmirror::property::{NodeProperty, PropertyValue};
//! use axmirror::role::Role;
//! use axmirror::text_run::{TextRun, TextRuns};
//! use axmirror::tree::{SnapshotTreeBuilder, TreeReader, TreeRegistry};
//!
//! // Owner side: describe the live tree and generate the snapshot.
//! let root = NodeId::from_raw(1).unwrap();
//! let text = NodeId::from_raw(2).unwrap();
//! let mut live = StaticLiveTree::new();
//! live.insert_node(root, Role::ContentArea, None, vec![text]);
//! live.insert_node(text, Role::StaticText, Some(root), vec![]);
//! live.set_property(
//!     text,
//!     NodeProperty::TextRuns,
//!     PropertyValue::TextRuns(Arc::new(TextRuns::new(
//!         Some(root),
//!         vec![TextRun::new("hello", 0)],
//!     ))),
//! );
//! live.set_root(root);
//!
//! let registry = TreeRegistry::new();
//! let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
//! tree.generate_subtree(&live, root);
//!
//! // Reader side: drain, then query without any further locking.
//! let mut reader = TreeReader::new(tree);
//! reader.apply_pending_changes();
//! assert_eq!(reader.len(), 2);
//! let last = reader.first_marker().find_last(&reader);
//! assert_eq!(last.offset(), 5);
//! ```

pub mod error;
pub mod geometry;
pub mod id;
pub mod live;
pub mod marker;
pub mod node;
pub mod property;
pub mod range;
pub mod role;
pub mod text_run;
pub mod tree;
pub mod units;

pub use error::{TreeError, TreeResult};
pub use geometry::{GeometryCache, Point, Rect, Size};
pub use id::{NodeId, TreeId};
pub use live::{LiveTreeSource, StaticLiveTree};
pub use marker::{CoalesceObjectBreaks, Direction, IgnoreLineBreaks, MarkerOrigin, TextMarker};
pub use node::{NodeData, NodeSnapshot, PlatformHandle};
pub use property::{
    CharacterRange, EmissionBehavior, NodeProperty, PropertyFlag, PropertyFlags, PropertyValue,
    is_default_value,
};
pub use range::{LineRangeType, SentenceRangeType, TextMarkerRange, WordRangeType};
pub use role::Role;
pub use text_run::{Affinity, LineId, TextRun, TextRuns};
pub use tree::{
    NodeChange, NodeUpdateOptions, PropertyChange, ResolveNodeChanges, SnapshotTree,
    SnapshotTreeBuilder, TreeReader, TreeRegistry,
};
pub use units::{IncludeTrailingLineBreak, TextUnitBoundary};
