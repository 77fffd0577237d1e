//! Pure data models: paths, entries, the derived tree and tabs.

pub mod entry_store;
pub mod path;
pub mod tabs;
pub mod tree;

pub use entry_store::{Entry, EntryKind, EntryStore};
pub use tabs::{Tab, TabRegistry};
pub use tree::{flatten_for_view, project, TreeNode, TreeRow};
