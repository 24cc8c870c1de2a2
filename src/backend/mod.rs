pub mod alquran;
pub mod annotation;
pub mod audio;
pub mod bookmarks;
pub mod cache;
pub mod error;
pub mod gesture;
pub mod kv;
pub mod model;
pub mod page_store;
pub mod playback;
pub mod preload;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
