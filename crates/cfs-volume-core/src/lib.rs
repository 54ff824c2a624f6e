//! Core volume abstraction shared by every `cfs` backend and composite.
//!
//! A [`Volume`] is a small, capability-discriminated filesystem facade:
//! every backend implements the same trait, and operations it cannot
//! perform fail at the call site rather than being hidden behind a
//! different type. [`ReadOnlyVolume`], [`VolumeGroup`], and [`AutoUnzip`]
//! are composites built purely in terms of that trait.

mod autounzip;
mod error;
mod group;
mod info;
mod readonly;
#[cfg(test)]
mod test_support;
mod volume;
pub mod walk;

pub use autounzip::{ArchiveOpener, AutoUnzip, ARCHIVE_SEPARATOR};
pub use error::{PathError, PathErrorKind, PathResult};
pub use group::VolumeGroup;
pub use info::{normalize_path, FileInfo, FileMode, Metadata};
pub use readonly::ReadOnlyVolume;
pub use volume::{Capabilities, EventStream, FileReader, FileWriter, Volume, WatchEvent, WatchEventKind};
