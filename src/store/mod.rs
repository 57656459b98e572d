//! Concurrency-safe stores backing the catalog and auth services.
//!
//! Each store owns its map behind its own lock and hands out copies, so no
//! caller can reach a stored value through a handle it holds.

/// Device records and search.
pub mod device;

/// Uploaded device images.
pub mod image;

/// Per-device rating aggregates.
pub mod rating;

/// User credentials.
pub mod user;

pub use device::{DeviceSink, DeviceStore, InMemoryDeviceStore};
pub use image::{DiskImageStore, ImageRecord, ImageStore};
pub use rating::{InMemoryRatingStore, Rating, RatingStore};
pub use user::{InMemoryUserStore, User, UserStore};
