//! # modsave
//!
//! Player-scoped save data store for game mods.
//!
//! This library provides functionality to:
//! - Serialize mod-defined objects to per-player JSON files
//! - Track which persisted files are still claimed by live objects
//! - Sweep orphaned files when the in-game day ends
//! - Substitute opaque engine values (rectangles, textures, items) with
//!   stable string forms
//! - Keep rotated, hash-tracked backups of a player's object files
//!
//! ## Example
//!
//! ```no_run
//! use modsave::{PlayerKey, SaveStore};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Recipe {
//!     outputs: Vec<String>,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SaveStore::new("mods/MyMod");
//! let player = PlayerKey::new("Ash", 42);
//!
//! // Persist an object, then reload the save.
//! store.write(&player, "Recipe1", "recipe", &Recipe { outputs: vec![] })?;
//! store.on_save_loaded(&player)?;
//!
//! // Objects claim their files by reading them back.
//! let recipe: Recipe = store.read(&player, "Recipe1", "recipe")?;
//!
//! // Anything never claimed is deleted before the game saves.
//! let orphans = store.on_day_ending(&player);
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod codec;
pub mod registry;
pub mod store;
pub mod tracker;

// Re-export commonly used items
#[doc(inline)]
pub use backup::{snapshot, BackupError, BackupMetadata};
#[doc(inline)]
pub use codec::{BackRef, Codec, CodecError, ConvertRule};
#[doc(inline)]
pub use registry::{DecodeRegistry, RegistryError};
#[doc(inline)]
pub use store::{PlayerKey, SaveStore, StoreError};
#[doc(inline)]
pub use tracker::{LivenessTracker, TrackerState};

// Stand-in engine types handled by the built-in conversion rules
#[doc(inline)]
pub use codec::rules::{ItemHandle, Rect, TextureHandle};
