//! Incremental builders emitting the MVT wire format.
//!
//! A [`TileBuilder`] owns the output buffer; a [`LayerBuilder`] borrows it
//! and accumulates features plus the layer's key/value dictionaries; the
//! three feature builders borrow the layer builder exclusively, stage one
//! feature, and append it atomically on `commit`. Dropping an uncommitted
//! feature builder rolls the feature back; nothing reaches the layer
//! buffer before `commit`.

use crate::codec;
use crate::error::{Error, Result};
use crate::feature::{self, Feature};
use crate::geometry::{
    GEOM_COMMAND_CLOSE_PATH_WITH_COUNT1, GEOM_COMMAND_LINE_TO, GEOM_COMMAND_MOVE_TO,
    GEOM_COMMAND_MOVE_TO_WITH_COUNT1, GeomType, zigzag,
};
use crate::index::{HashedKeyIndex, HashedValueIndex, KeyIndex, ValueIndex};
use crate::layer::{self, Layer};
use crate::tile::TILE_LAYERS;
use crate::value::Value;

// command counts occupy the upper 29 bits of a command integer
const MAX_COMMAND_COUNT: u32 = (1 << 29) - 1;

/// Accumulates serialized layers into a tile.
#[derive(Debug, Default)]
pub struct TileBuilder {
    buf: Vec<u8>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Copies a decoded layer through unchanged.
    pub fn add_existing_layer(&mut self, layer: &Layer<'_>) {
        codec::put_bytes(&mut self.buf, TILE_LAYERS, layer.data());
    }

    /// Consumes the builder and returns the tile bytes.
    pub fn serialize(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn push_layer(&mut self, body: &[u8]) {
        codec::put_bytes(&mut self.buf, TILE_LAYERS, body);
    }
}

/// Builds one layer of a tile.
///
/// The serialized layer is appended to the tile builder on [`finish`]
/// (or drop); a layer without features is not written at all.
///
/// [`finish`]: LayerBuilder::finish
pub struct LayerBuilder<'a> {
    tile: &'a mut TileBuilder,
    name: String,
    version: u32,
    extent: u32,
    features: Vec<u8>,
    keys: Vec<String>,
    values: Vec<Value>,
    key_index: Box<dyn KeyIndex>,
    value_index: Box<dyn ValueIndex>,
    finished: bool,
}

impl<'a> LayerBuilder<'a> {
    /// New layer with version 2 and the default extent of 4096.
    pub fn new(tile: &'a mut TileBuilder, name: &str) -> Self {
        Self::with_params(tile, name, 2, layer::DEFAULT_EXTENT)
    }

    pub fn with_params(tile: &'a mut TileBuilder, name: &str, version: u32, extent: u32) -> Self {
        Self::with_indexes(
            tile,
            name,
            version,
            extent,
            Box::new(HashedKeyIndex::new()),
            Box::new(HashedValueIndex::new()),
        )
    }

    /// New layer with caller-chosen key/value deduplication policies.
    pub fn with_indexes(
        tile: &'a mut TileBuilder,
        name: &str,
        version: u32,
        extent: u32,
        key_index: Box<dyn KeyIndex>,
        value_index: Box<dyn ValueIndex>,
    ) -> Self {
        Self {
            tile,
            name: name.to_string(),
            version,
            extent,
            features: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            key_index,
            value_index,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Interns a key into the layer dictionary and returns its index.
    pub fn add_key(&mut self, key: &str) -> u32 {
        self.key_index.intern(&mut self.keys, key)
    }

    /// Interns a value into the layer dictionary and returns its index.
    pub fn add_value(&mut self, value: impl Into<Value>) -> u32 {
        self.value_index.intern(&mut self.values, value.into())
    }

    /// Starts a point (or multipoint) feature.
    pub fn point_feature(&mut self) -> PointFeatureBuilder<'_, 'a> {
        PointFeatureBuilder {
            w: FeatureWriter::new(self, GeomType::Point),
        }
    }

    /// Starts a linestring (or multilinestring) feature.
    pub fn linestring_feature(&mut self) -> LinestringFeatureBuilder<'_, 'a> {
        LinestringFeatureBuilder {
            w: FeatureWriter::new(self, GeomType::Linestring),
        }
    }

    /// Starts a polygon (or multipolygon) feature.
    pub fn polygon_feature(&mut self) -> PolygonFeatureBuilder<'_, 'a> {
        PolygonFeatureBuilder {
            w: FeatureWriter::new(self, GeomType::Polygon),
            start: [0, 0],
        }
    }

    /// Copies a decoded feature into this layer. The geometry is taken
    /// over verbatim; properties are re-interned into this layer's
    /// dictionaries.
    pub fn add_feature<'t>(&mut self, layer: &Layer<'t>, feat: &Feature<'t>) -> Result<()> {
        let mut tags = Vec::new();
        let mut failed = None;
        feat.for_each_property(layer, |key, value| {
            let Ok(key) = std::str::from_utf8(key) else {
                failed = Some(Error::Format("layer key is not valid UTF-8".into()));
                return false;
            };
            match value.decode() {
                Ok(value) => {
                    let key_index = self.add_key(key);
                    let value_index = self.add_value(Value::from(value));
                    tags.extend([key_index, value_index]);
                    true
                }
                Err(e) => {
                    failed = Some(e);
                    false
                }
            }
        })?;
        if let Some(e) = failed {
            return Err(e);
        }

        let mut body = Vec::new();
        if feat.has_id() {
            codec::put_varint(&mut body, feature::FEATURE_ID, feat.id());
        }
        codec::put_packed_u32(&mut body, feature::FEATURE_TAGS, &tags);
        let geom = feat.geometry();
        if geom.geom_type() != GeomType::Unknown {
            codec::put_varint(&mut body, feature::FEATURE_TYPE, geom.geom_type() as u64);
        }
        if !geom.data().is_empty() {
            codec::put_bytes(&mut body, feature::FEATURE_GEOMETRY, geom.data());
        }
        codec::put_bytes(&mut self.features, layer::LAYER_FEATURES, &body);
        Ok(())
    }

    /// Serializes the layer into the owning tile builder. Dropping the
    /// builder has the same effect.
    pub fn finish(self) {}

    fn flush(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        // a layer without features is not written
        if self.features.is_empty() {
            return;
        }

        let mut body = Vec::with_capacity(self.features.len() + 64);
        codec::put_bytes(&mut body, layer::LAYER_NAME, self.name.as_bytes());
        body.extend_from_slice(&self.features);
        for key in &self.keys {
            codec::put_bytes(&mut body, layer::LAYER_KEYS, key.as_bytes());
        }
        let mut record = Vec::new();
        for value in &self.values {
            record.clear();
            value.encode(&mut record);
            codec::put_bytes(&mut body, layer::LAYER_VALUES, &record);
        }
        codec::put_varint(&mut body, layer::LAYER_EXTENT, self.extent as u64);
        codec::put_varint(&mut body, layer::LAYER_VERSION, self.version as u64);
        self.tile.push_layer(&body);
    }
}

impl Drop for LayerBuilder<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Init,
    HasId,
    Geometry,
    Properties,
}

/// Shared core of the three feature builders: id, staged geometry and
/// tags, and the lifecycle state machine.
struct FeatureWriter<'l, 'a> {
    layer: &'l mut LayerBuilder<'a>,
    geom_type: GeomType,
    id: Option<u64>,
    geometry: Vec<u32>,
    tags: Vec<u32>,
    stage: Stage,
    /// points still owed to the current primitive
    pending: u32,
    /// command integer emitted after the primitive's first point
    queued_cmd: Option<u32>,
    prev: [i32; 2],
}

impl<'l, 'a> FeatureWriter<'l, 'a> {
    fn new(layer: &'l mut LayerBuilder<'a>, geom_type: GeomType) -> Self {
        Self {
            layer,
            geom_type,
            id: None,
            geometry: Vec::new(),
            tags: Vec::new(),
            stage: Stage::Init,
            pending: 0,
            queued_cmd: None,
            prev: [0, 0],
        }
    }

    fn set_id(&mut self, id: u64) -> Result<()> {
        if self.stage != Stage::Init {
            return Err(Error::Assert("set_id is only permitted before geometry"));
        }
        self.id = Some(id);
        self.stage = Stage::HasId;
        Ok(())
    }

    fn begin_geometry(&mut self, repeat_err: Option<&'static str>) -> Result<()> {
        if self.pending != 0 {
            return Err(Error::Assert("previous primitive is missing points"));
        }
        match self.stage {
            Stage::Init | Stage::HasId => {
                self.stage = Stage::Geometry;
                Ok(())
            }
            Stage::Geometry => match repeat_err {
                None => Ok(()),
                Some(msg) => Err(Error::Assert(msg)),
            },
            Stage::Properties => Err(Error::Assert("geometry must precede properties")),
        }
    }

    fn take_pending_point(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Err(Error::Assert("more set_point calls than declared points"));
        }
        self.pending -= 1;
        Ok(())
    }

    fn push_delta(&mut self, x: i32, y: i32) {
        self.geometry.push(zigzag(x.wrapping_sub(self.prev[0])));
        self.geometry.push(zigzag(y.wrapping_sub(self.prev[1])));
        self.prev = [x, y];
        if let Some(cmd) = self.queued_cmd.take() {
            self.geometry.push(cmd);
        }
    }

    fn require_complete_geometry(&self) -> Result<()> {
        if self.stage < Stage::Geometry {
            return Err(Error::Assert("feature has no geometry"));
        }
        if self.pending != 0 {
            return Err(Error::Assert("current primitive is missing points"));
        }
        Ok(())
    }

    fn add_property(&mut self, key: &str, value: Value) -> Result<()> {
        self.require_complete_geometry()?;
        let key_index = self.layer.add_key(key);
        let value_index = self.layer.add_value(value);
        self.tags.extend([key_index, value_index]);
        self.stage = Stage::Properties;
        Ok(())
    }

    fn add_property_by_index(&mut self, key_index: u32, value_index: u32) -> Result<()> {
        self.require_complete_geometry()?;
        if key_index as usize >= self.layer.keys.len() {
            return Err(Error::Assert("key index does not resolve in this layer"));
        }
        if value_index as usize >= self.layer.values.len() {
            return Err(Error::Assert("value index does not resolve in this layer"));
        }
        self.tags.extend([key_index, value_index]);
        self.stage = Stage::Properties;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.require_complete_geometry()?;
        let mut body = Vec::with_capacity(self.geometry.len() * 2 + self.tags.len() * 2 + 16);
        if let Some(id) = self.id {
            codec::put_varint(&mut body, feature::FEATURE_ID, id);
        }
        codec::put_packed_u32(&mut body, feature::FEATURE_TAGS, &self.tags);
        codec::put_varint(&mut body, feature::FEATURE_TYPE, self.geom_type as u64);
        codec::put_packed_u32(&mut body, feature::FEATURE_GEOMETRY, &self.geometry);
        codec::put_bytes(&mut self.layer.features, layer::LAYER_FEATURES, &body);
        Ok(())
    }
}

macro_rules! shared_feature_ops {
    () => {
        /// Sets the feature id. Only permitted before any geometry.
        pub fn set_id(&mut self, id: u64) -> Result<()> {
            self.w.set_id(id)
        }

        /// Adds a property, interning key and value through the layer's
        /// indexes. Only permitted once the geometry is complete.
        pub fn add_property(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
            self.w.add_property(key, value.into())
        }

        /// Adds a property from pre-resolved dictionary indices.
        pub fn add_property_by_index(&mut self, key_index: u32, value_index: u32) -> Result<()> {
            self.w.add_property_by_index(key_index, value_index)
        }

        /// Finalizes the feature and appends it to the layer.
        pub fn commit(self) -> Result<()> {
            self.w.commit()
        }

        /// Discards the feature. Equivalent to dropping the builder.
        pub fn rollback(self) {}
    };
}

/// Builds one point or multipoint feature.
pub struct PointFeatureBuilder<'l, 'a> {
    w: FeatureWriter<'l, 'a>,
}

impl PointFeatureBuilder<'_, '_> {
    shared_feature_ops!();

    /// Declares `count` points, to be delivered through `set_point`.
    /// May only be called once per feature.
    pub fn add_points(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(Error::Assert("point count must be positive"));
        }
        if count > MAX_COMMAND_COUNT {
            return Err(Error::Assert("point count out of range"));
        }
        self.w.begin_geometry(Some("points may only be declared once"))?;
        self.w.geometry.push(GEOM_COMMAND_MOVE_TO | count << 3);
        self.w.pending = count;
        Ok(())
    }

    /// Shorthand for a single-point feature.
    pub fn add_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.add_points(1)?;
        self.set_point(x, y)
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.w.take_pending_point()?;
        self.w.push_delta(x, y);
        Ok(())
    }
}

/// Builds one linestring or multilinestring feature.
pub struct LinestringFeatureBuilder<'l, 'a> {
    w: FeatureWriter<'l, 'a>,
}

impl LinestringFeatureBuilder<'_, '_> {
    shared_feature_ops!();

    /// Declares the next linestring with `count` points (at least 2).
    pub fn add_linestring(&mut self, count: u32) -> Result<()> {
        if count < 2 {
            return Err(Error::Assert("linestring must have at least 2 points"));
        }
        if count - 1 > MAX_COMMAND_COUNT {
            return Err(Error::Assert("linestring point count out of range"));
        }
        self.w.begin_geometry(None)?;
        self.w.geometry.push(GEOM_COMMAND_MOVE_TO_WITH_COUNT1);
        self.w.queued_cmd = Some(GEOM_COMMAND_LINE_TO | (count - 1) << 3);
        self.w.pending = count;
        Ok(())
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.w.take_pending_point()?;
        self.w.push_delta(x, y);
        Ok(())
    }
}

/// Builds one polygon or multipolygon feature.
///
/// A ring of `n` points may be delivered either as `n` calls to
/// `set_point` with the last point equal to the first, or as `n - 1`
/// calls followed by `close_ring`; both emit the same ClosePath command.
/// Ring orientation is the caller's responsibility.
pub struct PolygonFeatureBuilder<'l, 'a> {
    w: FeatureWriter<'l, 'a>,
    start: [i32; 2],
}

impl PolygonFeatureBuilder<'_, '_> {
    shared_feature_ops!();

    /// Declares the next ring with `count` points including the closing
    /// point (at least 4).
    pub fn add_ring(&mut self, count: u32) -> Result<()> {
        if count < 4 {
            return Err(Error::Assert("ring must have at least 4 points"));
        }
        if count - 2 > MAX_COMMAND_COUNT {
            return Err(Error::Assert("ring point count out of range"));
        }
        self.w.begin_geometry(None)?;
        self.w.geometry.push(GEOM_COMMAND_MOVE_TO_WITH_COUNT1);
        self.w.queued_cmd = Some(GEOM_COMMAND_LINE_TO | (count - 2) << 3);
        self.w.pending = count;
        Ok(())
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        if self.w.pending == 1 {
            // the closing point is not encoded; ClosePath implies it
            if [x, y] != self.start {
                return Err(Error::Assert("last point of a ring must equal the first"));
            }
            self.w.geometry.push(GEOM_COMMAND_CLOSE_PATH_WITH_COUNT1);
            self.w.pending = 0;
            return Ok(());
        }
        self.w.take_pending_point()?;
        if self.w.queued_cmd.is_some() {
            self.start = [x, y];
        }
        self.w.push_delta(x, y);
        Ok(())
    }

    /// Closes the current ring in place of its final point.
    pub fn close_ring(&mut self) -> Result<()> {
        if self.w.pending != 1 {
            return Err(Error::Assert(
                "close_ring is only permitted in place of the final ring point",
            ));
        }
        self.w.geometry.push(GEOM_COMMAND_CLOSE_PATH_WITH_COUNT1);
        self.w.pending = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileReader;

    fn pack(values: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        for &v in values {
            prost::encoding::encode_varint(v as u64, &mut buf);
        }
        buf
    }

    fn first_feature(tile: &[u8]) -> (Vec<u8>, Feature<'_>) {
        let mut reader = TileReader::new(tile);
        let mut layer = reader.next_layer().unwrap().unwrap();
        let feature = layer.next_feature().unwrap().unwrap();
        (layer.name().to_vec(), feature)
    }

    #[test]
    fn linestring_delta_stream() {
        let mut tile = TileBuilder::new();
        {
            let mut layer = LayerBuilder::new(&mut tile, "lines");
            let mut fb = layer.linestring_feature();
            fb.add_linestring(3).unwrap();
            fb.set_point(3, 6).unwrap();
            fb.set_point(8, 12).unwrap();
            fb.set_point(5, 10).unwrap();
            fb.commit().unwrap();
        }
        let bytes = tile.serialize();
        let (_, feature) = first_feature(&bytes);
        assert_eq!(feature.geom_type(), GeomType::Linestring);
        assert_eq!(feature.geometry().data(), pack(&[9, 6, 12, 18, 10, 12, 5, 3]));
    }

    #[test]
    fn polygon_both_closing_forms_agree() {
        let build = |close_explicitly: bool| {
            let mut tile = TileBuilder::new();
            {
                let mut layer = LayerBuilder::new(&mut tile, "polys");
                let mut fb = layer.polygon_feature();
                fb.add_ring(5).unwrap();
                fb.set_point(0, 0).unwrap();
                fb.set_point(10, 0).unwrap();
                fb.set_point(10, 10).unwrap();
                fb.set_point(0, 10).unwrap();
                if close_explicitly {
                    fb.close_ring().unwrap();
                } else {
                    fb.set_point(0, 0).unwrap();
                }
                fb.commit().unwrap();
            }
            tile.serialize()
        };
        assert_eq!(build(true), build(false));
    }

    #[test]
    fn ring_closing_point_must_match_start() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "polys");
        let mut fb = layer.polygon_feature();
        fb.add_ring(4).unwrap();
        fb.set_point(0, 0).unwrap();
        fb.set_point(10, 0).unwrap();
        fb.set_point(10, 10).unwrap();
        assert!(matches!(fb.set_point(5, 5), Err(Error::Assert(_))));
    }

    #[test]
    fn state_machine_preconditions() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");

        {
            let mut fb = layer.point_feature();
            fb.set_id(1).unwrap();
            assert!(matches!(fb.set_id(2), Err(Error::Assert(_))));
            assert!(matches!(fb.set_point(0, 0), Err(Error::Assert(_))));
            assert!(matches!(fb.add_property("k", 1u32), Err(Error::Assert(_))));
            fb.add_points(1).unwrap();
            assert!(matches!(fb.set_id(3), Err(Error::Assert(_))));
            assert!(matches!(fb.add_points(1), Err(Error::Assert(_))));
            assert!(matches!(fb.add_property("k", 1u32), Err(Error::Assert(_))));
            fb.set_point(2, 2).unwrap();
            assert!(matches!(fb.set_point(3, 3), Err(Error::Assert(_))));
            fb.add_property("k", 1u32).unwrap();
            fb.commit().unwrap();
        }

        {
            let mut fb = layer.point_feature();
            assert!(matches!(fb.add_points(0), Err(Error::Assert(_))));
            assert!(matches!(fb.commit(), Err(Error::Assert(_))));
        }

        {
            let mut fb = layer.linestring_feature();
            assert!(matches!(fb.add_linestring(1), Err(Error::Assert(_))));
            fb.add_linestring(2).unwrap();
            fb.set_point(0, 0).unwrap();
            // still owes one point
            assert!(matches!(fb.add_linestring(2), Err(Error::Assert(_))));
            assert!(matches!(fb.commit(), Err(Error::Assert(_))));
        }

        {
            let mut fb = layer.polygon_feature();
            assert!(matches!(fb.add_ring(3), Err(Error::Assert(_))));
            assert!(matches!(fb.close_ring(), Err(Error::Assert(_))));
            // a rejected ring declaration must not count as geometry
            assert!(matches!(fb.commit(), Err(Error::Assert(_))));
        }
    }

    #[test]
    fn uncommitted_feature_rolls_back() {
        let mut tile = TileBuilder::new();
        {
            let mut layer = LayerBuilder::new(&mut tile, "test");
            let mut fb = layer.point_feature();
            fb.add_point(1, 1).unwrap();
            fb.rollback();
        }
        // the only feature rolled back, so the layer is not written either
        assert!(tile.serialize().is_empty());
    }

    #[test]
    fn empty_layer_is_omitted() {
        let mut tile = TileBuilder::new();
        LayerBuilder::new(&mut tile, "empty").finish();
        assert!(tile.serialize().is_empty());
    }

    #[test]
    fn property_interning_deduplicates() {
        let mut tile = TileBuilder::new();
        {
            let mut layer = LayerBuilder::new(&mut tile, "test");
            for i in 0..2 {
                let mut fb = layer.point_feature();
                fb.add_point(i, i).unwrap();
                fb.add_property("kind", "tree").unwrap();
                fb.add_property("height", 3u32).unwrap();
                fb.commit().unwrap();
            }
        }
        let bytes = tile.serialize();
        let mut reader = TileReader::new(&bytes);
        let layer = reader.next_layer().unwrap().unwrap();
        assert_eq!(layer.key_table().len(), 2);
        assert_eq!(layer.value_table().len(), 2);
    }

    #[test]
    fn pre_resolved_indices_are_bounds_checked() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let key = layer.add_key("kind");
        let value = layer.add_value("tree");

        let mut fb = layer.point_feature();
        fb.add_point(0, 0).unwrap();
        fb.add_property_by_index(key, value).unwrap();
        assert!(matches!(
            fb.add_property_by_index(9, value),
            Err(Error::Assert(_))
        ));
        assert!(matches!(
            fb.add_property_by_index(key, 9),
            Err(Error::Assert(_))
        ));
        fb.commit().unwrap();
    }

    #[test]
    fn committing_same_feature_twice_is_byte_identical() {
        let build = || {
            let mut tile = TileBuilder::new();
            {
                let mut layer = LayerBuilder::new(&mut tile, "test");
                let mut fb = layer.point_feature();
                fb.set_id(7).unwrap();
                fb.add_point(12, 34).unwrap();
                fb.add_property("kind", "tree").unwrap();
                fb.commit().unwrap();
            }
            tile.serialize()
        };
        assert_eq!(build(), build());
    }
}
