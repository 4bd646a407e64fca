//! Root crate facade for the PhotoFlip gallery core.

pub use photoflip_core::{
    archive, config, constants, content, db, drag, error, gallery, models, AppError, Config,
    ContentStore, Database, Gallery, GalleryEvent, RecordStore,
};
