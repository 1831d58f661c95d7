//! Hot-reloading key/value settings backed by one line-oriented text file.
//!
//! A [`Settings`] value re-validates its cache against the file's modification
//! stamp on every access, fills in declared keys the file lacks and refuses to
//! overwrite a file that changed since it was last read.

pub mod format;
pub mod fs;
pub mod store;

pub use fs::{DirEntry, DiskFs, MemoryFs, SettingsFs};
pub use store::{SettingDef, Settings, WriteOutcome};
