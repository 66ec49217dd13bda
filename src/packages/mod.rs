// src/packages/mod.rs

//! Native package manager adapters
//!
//! The resolver only sees the [`NativeCatalog`] trait; pacman is the
//! shipped backend, [`StaticCatalog`] the in-memory one.

pub mod pacman_query;
pub mod traits;

pub use pacman_query::{PacmanCatalog, is_pacman_available};
pub use traits::{CatalogEntry, CatalogOrigin, NativeCatalog, StaticCatalog};
