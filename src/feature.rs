//! Lazy accessor for one feature record.

use crate::codec::{FieldReader, PackedVarints};
use crate::error::{Error, Result};
use crate::geometry::{GeomType, Geometry};
use crate::layer::Layer;
use crate::value::ValueView;

pub(crate) const FEATURE_ID: u32 = 1;
pub(crate) const FEATURE_TAGS: u32 = 2;
pub(crate) const FEATURE_TYPE: u32 = 3;
pub(crate) const FEATURE_GEOMETRY: u32 = 4;

/// View over one feature of a layer.
///
/// Construction captures the field ranges of the record; the tag stream
/// and the geometry stay raw until asked for. The feature borrows the
/// tile buffer only, so it stays usable while its layer is iterated.
#[derive(Debug, Clone, Copy)]
pub struct Feature<'a> {
    id: Option<u64>,
    geom_type: GeomType,
    tags: &'a [u8],
    geometry: &'a [u8],
}

impl<'a> Feature<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Result<Self> {
        let mut id = None;
        let mut geom_type = GeomType::Unknown;
        let mut tags: &'a [u8] = &[];
        let mut geometry: &'a [u8] = &[];

        let mut r = FieldReader::new(data);
        while let Some((field, wire_type)) = r.next_key()? {
            match field {
                FEATURE_ID => id = Some(r.varint(wire_type)?),
                FEATURE_TAGS => tags = r.bytes(wire_type)?,
                FEATURE_TYPE => geom_type = GeomType::from_raw(r.varint(wire_type)?)?,
                FEATURE_GEOMETRY => geometry = r.bytes(wire_type)?,
                _ => r.skip(wire_type)?,
            }
        }

        Ok(Self { id, geom_type, tags, geometry })
    }

    /// Feature id; 0 when the record carries none.
    pub fn id(&self) -> u64 {
        self.id.unwrap_or(0)
    }

    /// Whether the record carries an explicit id.
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    /// The feature's geometry type and raw command stream.
    pub fn geometry(&self) -> Geometry<'a> {
        Geometry::new(self.geom_type, self.geometry)
    }

    /// Raw packed tag stream (alternating key/value indices).
    pub fn tag_data(&self) -> &'a [u8] {
        self.tags
    }

    /// Walks the feature's properties, resolving tag indices through the
    /// layer's dictionaries. The callback returns `false` to stop early;
    /// the return value is `false` iff the walk was stopped.
    pub fn for_each_property<F>(&self, layer: &Layer<'a>, mut func: F) -> Result<bool>
    where
        F: FnMut(&'a [u8], ValueView<'a>) -> bool,
    {
        let mut it = PackedVarints::new(self.tags);
        while let Some(key_index) = it.next_varint() {
            let key_index = key_index?;
            let value_index = match it.next_varint() {
                Some(v) => v?,
                None => {
                    return Err(Error::Format("odd number of entries in tag stream".into()));
                }
            };
            let key_index = u32::try_from(key_index).map_err(|_| Error::OutOfRange(key_index))?;
            let value_index =
                u32::try_from(value_index).map_err(|_| Error::OutOfRange(value_index))?;
            let key = layer.key(key_index)?;
            let value = layer.value(value_index)?;
            if !func(key, value) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
