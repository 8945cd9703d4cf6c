//! Layer reader: iterates features and materializes the key/value
//! dictionaries on first access.

use std::sync::OnceLock;

use crate::codec::FieldReader;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::value::ValueView;

pub(crate) const LAYER_NAME: u32 = 1;
pub(crate) const LAYER_FEATURES: u32 = 2;
pub(crate) const LAYER_KEYS: u32 = 3;
pub(crate) const LAYER_VALUES: u32 = 4;
pub(crate) const LAYER_EXTENT: u32 = 5;
pub(crate) const LAYER_VERSION: u32 = 15;

const DEFAULT_VERSION: u32 = 1;
pub(crate) const DEFAULT_EXTENT: u32 = 4096;

#[derive(Debug)]
struct Tables<'a> {
    keys: Vec<&'a [u8]>,
    values: Vec<ValueView<'a>>,
}

/// View over one layer record.
///
/// Construction scans the header fields (`version`, `name`, `extent`) and
/// counts features, keys and values; the dictionaries are collected at
/// most once, on first access, behind a [`OnceLock`]. Everything returned
/// from the layer borrows the tile buffer.
#[derive(Debug)]
pub struct Layer<'a> {
    data: &'a [u8],
    name: &'a [u8],
    version: u32,
    extent: u32,
    num_features: usize,
    num_keys: usize,
    num_values: usize,
    cursor: &'a [u8],
    tables: OnceLock<Tables<'a>>,
}

impl<'a> Layer<'a> {
    /// Parses a layer record header.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut name = None;
        let mut version: u64 = DEFAULT_VERSION as u64;
        let mut extent: u64 = DEFAULT_EXTENT as u64;
        let mut num_features = 0;
        let mut num_keys = 0;
        let mut num_values = 0;

        let mut r = FieldReader::new(data);
        while let Some((field, wire_type)) = r.next_key()? {
            match field {
                LAYER_NAME => {
                    if name.is_some() {
                        return Err(Error::Format("duplicate name in layer".into()));
                    }
                    name = Some(r.bytes(wire_type)?);
                }
                LAYER_FEATURES => {
                    r.bytes(wire_type)?;
                    num_features += 1;
                }
                LAYER_KEYS => {
                    r.bytes(wire_type)?;
                    num_keys += 1;
                }
                LAYER_VALUES => {
                    r.bytes(wire_type)?;
                    num_values += 1;
                }
                LAYER_EXTENT => extent = r.varint(wire_type)?,
                LAYER_VERSION => version = r.varint(wire_type)?,
                _ => {
                    return Err(Error::Format(format!("unknown field {field} in layer")));
                }
            }
        }

        if version != 1 && version != 2 {
            return Err(Error::Version(version));
        }
        let name = match name {
            Some(name) if !name.is_empty() => name,
            Some(_) => return Err(Error::Format("layer name must not be empty".into())),
            None => return Err(Error::Format("missing name in layer".into())),
        };
        let extent = u32::try_from(extent)
            .map_err(|_| Error::Format(format!("layer extent {extent} out of range")))?;
        if extent == 0 {
            return Err(Error::Format("layer extent must be positive".into()));
        }

        Ok(Self {
            data,
            name,
            version: version as u32,
            extent,
            num_features,
            num_keys,
            num_values,
            cursor: data,
            tables: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Raw bytes of the whole layer record.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the next feature, or `None` at the end of the layer.
    ///
    /// A malformed feature record yields an error but leaves the cursor
    /// past it, so iteration can continue.
    pub fn next_feature(&mut self) -> Option<Result<Feature<'a>>> {
        let mut r = FieldReader::new(self.cursor);
        loop {
            match r.next_key() {
                Ok(Some((field, wire_type))) => {
                    if field == LAYER_FEATURES {
                        let feature = r.bytes(wire_type).and_then(Feature::new);
                        self.cursor = r.rest();
                        return Some(feature);
                    }
                    if let Err(e) = r.skip(wire_type) {
                        self.cursor = r.rest();
                        return Some(Err(e));
                    }
                }
                Ok(None) => {
                    self.cursor = r.rest();
                    return None;
                }
                Err(e) => {
                    self.cursor = r.rest();
                    return Some(Err(e));
                }
            }
        }
    }

    /// Restores feature iteration to the first feature.
    pub fn reset(&mut self) {
        self.cursor = self.data;
    }

    /// Linear scan for a feature with the given id.
    pub fn feature_by_id(&self, id: u64) -> Result<Option<Feature<'a>>> {
        let mut r = FieldReader::new(self.data);
        while let Some((field, wire_type)) = r.next_key()? {
            if field == LAYER_FEATURES {
                let feature = Feature::new(r.bytes(wire_type)?)?;
                if feature.id() == id {
                    return Ok(Some(feature));
                }
            } else {
                r.skip(wire_type)?;
            }
        }
        Ok(None)
    }

    /// Key dictionary entry, bounds-checked.
    pub fn key(&self, index: u32) -> Result<&'a [u8]> {
        self.tables()
            .keys
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange(index as u64))
    }

    /// Value dictionary entry, bounds-checked.
    pub fn value(&self, index: u32) -> Result<ValueView<'a>> {
        self.tables()
            .values
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange(index as u64))
    }

    /// The full key dictionary, in appearance order.
    pub fn key_table(&self) -> &[&'a [u8]] {
        &self.tables().keys
    }

    /// The full value dictionary, in appearance order.
    pub fn value_table(&self) -> &[ValueView<'a>] {
        &self.tables().values
    }

    fn tables(&self) -> &Tables<'a> {
        self.tables.get_or_init(|| {
            let mut keys = Vec::with_capacity(self.num_keys);
            let mut values = Vec::with_capacity(self.num_values);
            // the record structure was validated in new(), so this pass
            // cannot fail
            let mut r = FieldReader::new(self.data);
            while let Ok(Some((field, wire_type))) = r.next_key() {
                match field {
                    LAYER_KEYS => {
                        if let Ok(key) = r.bytes(wire_type) {
                            keys.push(key);
                        }
                    }
                    LAYER_VALUES => {
                        if let Ok(value) = r.bytes(wire_type) {
                            values.push(ValueView::new(value));
                        }
                    }
                    _ => {
                        if r.skip(wire_type).is_err() {
                            break;
                        }
                    }
                }
            }
            Tables { keys, values }
        })
    }
}
