//! Data models shared by stores, the archive codec and the gallery.

/// Folder label models.
pub mod folder;
/// Photo item models.
pub mod item;
