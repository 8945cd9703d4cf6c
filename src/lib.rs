//! Zero-copy decoding and incremental encoding of Mapbox Vector Tiles
//! (MVT), versions 1 and 2.
//!
//! Readers are views over a caller-owned byte buffer: a [`TileReader`]
//! yields [`Layer`]s, a layer yields [`Feature`]s, and a feature's
//! geometry is decoded through a [`GeomHandler`] without materializing
//! intermediate containers. Builders go the other way: a [`TileBuilder`]
//! collects layers from [`LayerBuilder`]s, which hand out per-feature
//! builders enforcing the feature lifecycle and deduplicating keys and
//! values through pluggable [`index`] policies.
//!
//! ```
//! use mvtzero::{LayerBuilder, TileBuilder, TileReader};
//!
//! let mut tile = TileBuilder::new();
//! let mut layer = LayerBuilder::new(&mut tile, "poi");
//! let mut feature = layer.point_feature();
//! feature.set_id(17)?;
//! feature.add_point(10, 20)?;
//! feature.add_property("kind", "tree")?;
//! feature.commit()?;
//! layer.finish();
//! let bytes = tile.serialize();
//!
//! let mut reader = TileReader::new(&bytes);
//! let mut layer = reader.next_layer().unwrap()?;
//! assert_eq!(layer.name(), b"poi");
//! assert_eq!(layer.next_feature().unwrap()?.id(), 17);
//! # Ok::<(), mvtzero::Error>(())
//! ```

pub mod builder;
mod codec;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod index;
pub mod layer;
pub mod tile;
pub mod value;

pub use builder::{
    LayerBuilder, LinestringFeatureBuilder, PointFeatureBuilder, PolygonFeatureBuilder,
    TileBuilder,
};
pub use error::{Error, Result};
pub use feature::Feature;
pub use geometry::{
    GeomHandler, GeomType, Geometry, RingKind, decode_geometry, decode_linestring_geometry,
    decode_point_geometry, decode_polygon_geometry,
};
pub use layer::Layer;
pub use tile::TileReader;
pub use value::{Value, ValueKind, ValueRef, ValueView};
