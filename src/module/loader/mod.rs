//! Module loading and wiring
//!
//! Turns a requested module list plus scan collaborators into an ordered,
//! fully wired set of runnable instances. No single module failure aborts a
//! batch; partial success is the normal, explicitly reported outcome.

mod loader;

pub use loader::{
    Instantiator, LoadRequest, LoadResult, LoadedModule, ModuleLoader, OrderingMethod, ScanHandles,
};
