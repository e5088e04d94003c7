//! Renders the civic store as an Obsidian vault: one note per person and per
//! organization, plus generated index notes.

pub mod vault;

pub use vault::{build_vault, VaultPaths, VaultSummary};
