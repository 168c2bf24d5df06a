//! Process-wide options slot.
//!
//! Every render reads the options through a [`Snapshot`] taken when it starts.
//! Replacing the options never touches snapshots already handed out; in-flight
//! renders keep the values they started with and compare generations when
//! they finish to find out whether they went stale.

use super::Options;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Options tagged with the generation that installed them.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generation: u64,
    pub options: Options,
}

/// Atomically replaceable options with a monotonically increasing generation.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<Snapshot>,
}

impl ConfigStore {
    /// The initial options are generation 0.
    pub fn new(options: Options) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                generation: 0,
                options,
            }),
        }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Install new options and return their generation.
    pub fn replace(&self, options: Options) -> u64 {
        let previous = self.current.rcu(|current| Snapshot {
            generation: current.generation + 1,
            options: options.clone(),
        });
        previous.generation + 1
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
