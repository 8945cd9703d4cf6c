//! Tile reader: iterates the layers of a serialized tile.

use crate::codec::FieldReader;
use crate::error::Result;
use crate::layer::Layer;

pub(crate) const TILE_LAYERS: u32 = 3;

/// Forward iterator over the layers of a tile byte buffer.
#[derive(Debug, Clone)]
pub struct TileReader<'a> {
    cursor: &'a [u8],
}

impl<'a> TileReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { cursor: data }
    }

    /// Returns the next layer, or `None` at the end of the tile.
    /// Unknown tile-level fields are skipped.
    pub fn next_layer(&mut self) -> Option<Result<Layer<'a>>> {
        loop {
            let mut r = FieldReader::new(self.cursor);
            match r.next_key() {
                Ok(Some((field, wire_type))) => {
                    if field == TILE_LAYERS {
                        let layer = r.bytes(wire_type).and_then(Layer::new);
                        self.cursor = r.rest();
                        return Some(layer);
                    }
                    if let Err(e) = r.skip(wire_type) {
                        self.cursor = r.rest();
                        return Some(Err(e));
                    }
                    self.cursor = r.rest();
                }
                Ok(None) => return None,
                Err(e) => {
                    self.cursor = r.rest();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<'a> Iterator for TileReader<'a> {
    type Item = Result<Layer<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_layer()
    }
}
