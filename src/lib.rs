//! # TipKit engine
//!
//! Lifecycle and persistence for contextual in-app tips: whether a tip may be
//! shown now, how many times it has been shown, and when it is retired.
//!
//! Rendering is left to the caller. A presentation layer registers its tip on
//! mount, asks [`TipKit::show_tip`] before each impression, invalidates on
//! dismissal, and re-renders on [`TipEvent`]s.
//!
//! ```rust,no_run
//! use tipkit::{InvalidationReason, TipKit, TipOptions, TipRule};
//!
//! let kit = TipKit::in_memory();
//! let has_palettes = TipRule::new("has-palettes", || true);
//! kit.register_tip("create-new-palette", TipOptions::new(3), Some(&has_palettes))?;
//!
//! if kit.show_tip("create-new-palette")? {
//!     // render the popover
//! }
//!
//! kit.invalidate_tip("create-new-palette", InvalidationReason::ActionPerformed)?;
//! # Ok::<(), tipkit::TipError>(())
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod provider;
pub mod record;
pub mod rules;
pub mod store;
pub mod tipkit;
pub mod types;

pub use config::{StoreConfig, TipKitConfig};
pub use error::{StoreError, TipError, TipResult};
pub use events::{TipEvent, TipSubscription, SUBSCRIPTION_CAPACITY};
pub use provider::{use_tip_kit, TipKitProvider};
pub use record::{InvalidationReason, TipOptions, TipRecord, TipStatus};
pub use rules::{RuleEvaluator, RuleOutcome, TipRule};
pub use store::{MemoryStore, SqliteStore, TipStore};
pub use tipkit::{TipKit, TipKitStats};
