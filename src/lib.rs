//! Keep a Photoshop Elements catalog and the metadata embedded in its photos
//! in agreement.

pub mod catalog;
pub mod config;
pub mod error;
pub mod filemeta;
pub mod logging;
pub mod reconcile;
pub mod thumbnails;
