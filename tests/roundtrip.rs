//! End-to-end encode/decode tests.

use mvtzero::geometry::{
    GeomHandler, GeomType, RingKind, decode_linestring_geometry, decode_point_geometry,
    decode_polygon_geometry,
};
use mvtzero::value::Value;
use mvtzero::{Error, LayerBuilder, TileBuilder, TileReader};

#[derive(Default)]
struct Collect {
    points: Vec<[i32; 2]>,
    lines: Vec<Vec<[i32; 2]>>,
    rings: Vec<(Vec<[i32; 2]>, RingKind)>,
    current: Vec<[i32; 2]>,
}

impl GeomHandler for Collect {
    fn points_point(&mut self, p: [i32; 2]) {
        self.points.push(p);
    }
    fn linestring_point(&mut self, p: [i32; 2]) {
        self.current.push(p);
    }
    fn linestring_end(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
    }
    fn ring_point(&mut self, p: [i32; 2]) {
        self.current.push(p);
    }
    fn ring_end(&mut self, kind: RingKind) {
        self.rings.push((std::mem::take(&mut self.current), kind));
    }
}

fn properties<'t>(layer: &mvtzero::Layer<'t>, feature: &mvtzero::Feature<'t>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    feature
        .for_each_property(layer, |key, value| {
            out.push((
                String::from_utf8(key.to_vec()).unwrap(),
                Value::from(value.decode().unwrap()),
            ));
            true
        })
        .unwrap();
    out
}

#[test]
fn minimal_point_tile() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut fb = layer.point_feature();
        fb.set_id(17).unwrap();
        fb.add_points(1).unwrap();
        fb.set_point(10, 20).unwrap();
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let mut layer = reader.next_layer().unwrap().unwrap();
    assert!(reader.next_layer().is_none());

    assert_eq!(layer.name(), b"test");
    assert_eq!(layer.version(), 2);
    assert_eq!(layer.extent(), 4096);
    assert_eq!(layer.num_features(), 1);

    let feature = layer.next_feature().unwrap().unwrap();
    assert_eq!(feature.id(), 17);
    assert_eq!(feature.geom_type(), GeomType::Point);

    let mut out = Collect::default();
    decode_point_geometry(&feature.geometry(), true, &mut out).unwrap();
    assert_eq!(out.points, [[10, 20]]);
}

#[test]
fn polygon_with_hole_orientation() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "areas");
        let mut fb = layer.polygon_feature();
        // outer ring, clockwise in screen coordinates
        fb.add_ring(5).unwrap();
        for [x, y] in [[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]] {
            fb.set_point(x, y).unwrap();
        }
        // hole, wound the other way
        fb.add_ring(5).unwrap();
        for [x, y] in [[2, 2], [2, 8], [8, 8], [8, 2], [2, 2]] {
            fb.set_point(x, y).unwrap();
        }
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let mut layer = reader.next_layer().unwrap().unwrap();
    let feature = layer.next_feature().unwrap().unwrap();

    let mut out = Collect::default();
    decode_polygon_geometry(&feature.geometry(), true, &mut out).unwrap();
    assert_eq!(out.rings.len(), 2);
    assert_eq!(out.rings[0].0, [[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]);
    assert_eq!(out.rings[0].1, RingKind::Outer);
    assert_eq!(out.rings[1].0, [[2, 2], [2, 8], [8, 8], [8, 2], [2, 2]]);
    assert_eq!(out.rings[1].1, RingKind::Inner);
}

#[test]
fn strict_mode_rejects_what_lenient_accepts() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "lines");
        let mut fb = layer.linestring_feature();
        fb.add_linestring(3).unwrap();
        fb.set_point(0, 0).unwrap();
        fb.set_point(5, 5).unwrap();
        fb.set_point(5, 5).unwrap(); // zero-length segment
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let mut layer = reader.next_layer().unwrap().unwrap();
    let feature = layer.next_feature().unwrap().unwrap();

    let err = decode_linestring_geometry(&feature.geometry(), true, &mut Collect::default())
        .unwrap_err();
    assert!(matches!(err, Error::Geometry(_)));

    let mut out = Collect::default();
    decode_linestring_geometry(&feature.geometry(), false, &mut out).unwrap();
    assert_eq!(out.lines, [vec![[0, 0], [5, 5], [5, 5]]]);
}

#[test]
fn version_outside_range_is_rejected_at_layer_construction() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::with_params(&mut tile, "future", 3, 4096);
        let mut fb = layer.point_feature();
        fb.add_point(1, 1).unwrap();
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    assert_eq!(reader.next_layer().unwrap().unwrap_err(), Error::Version(3));
}

#[test]
fn lookup_feature_by_id() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "pois");
        for id in [4u64, 7, 11] {
            let mut fb = layer.point_feature();
            fb.set_id(id).unwrap();
            fb.add_point(id as i32, 0).unwrap();
            fb.commit().unwrap();
        }
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let layer = reader.next_layer().unwrap().unwrap();
    assert_eq!(layer.feature_by_id(7).unwrap().unwrap().id(), 7);
    assert!(layer.feature_by_id(99).unwrap().is_none());
}

#[test]
fn every_value_kind_survives_a_roundtrip() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut fb = layer.point_feature();
        fb.add_point(0, 0).unwrap();
        fb.add_property("string", "road").unwrap();
        fb.add_property("float", 1.5f32).unwrap();
        fb.add_property("double", 2.5f64).unwrap();
        fb.add_property("int", Value::Int(-3)).unwrap();
        fb.add_property("uint", 4u64).unwrap();
        fb.add_property("sint", -5i64).unwrap();
        fb.add_property("bool", true).unwrap();
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let mut layer = reader.next_layer().unwrap().unwrap();
    let feature = layer.next_feature().unwrap().unwrap();

    let props = properties(&layer, &feature);
    assert_eq!(
        props,
        [
            ("string".to_string(), Value::String("road".to_string())),
            ("float".to_string(), Value::Float(1.5f32.to_ne_bytes())),
            ("double".to_string(), Value::Double(2.5f64.to_ne_bytes())),
            ("int".to_string(), Value::Int(-3)),
            ("uint".to_string(), Value::Uint(4)),
            ("sint".to_string(), Value::SInt(-5)),
            ("bool".to_string(), Value::Bool(true)),
        ]
    );
}

#[test]
fn property_walk_can_stop_early() {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut fb = layer.point_feature();
        fb.add_point(0, 0).unwrap();
        fb.add_property("a", 1u32).unwrap();
        fb.add_property("b", 2u32).unwrap();
        fb.commit().unwrap();
    }
    let bytes = tile.serialize();

    let mut reader = TileReader::new(&bytes);
    let mut layer = reader.next_layer().unwrap().unwrap();
    let feature = layer.next_feature().unwrap().unwrap();

    let mut seen = 0;
    let completed = feature
        .for_each_property(&layer, |_, _| {
            seen += 1;
            false
        })
        .unwrap();
    assert!(!completed);
    assert_eq!(seen, 1);
}

/// Everything observable about a decoded tile, for equality checks.
type TileShape = Vec<(Vec<u8>, u32, u32, Vec<FeatureShape>)>;
type FeatureShape = (u64, bool, GeomType, Vec<u8>, Vec<(String, Value)>);

fn shape(bytes: &[u8]) -> TileShape {
    let mut out = Vec::new();
    let mut reader = TileReader::new(bytes);
    while let Some(layer) = reader.next_layer() {
        let mut layer = layer.unwrap();
        let mut features = Vec::new();
        while let Some(feature) = layer.next_feature() {
            let feature = feature.unwrap();
            features.push((
                feature.id(),
                feature.has_id(),
                feature.geom_type(),
                feature.geometry().data().to_vec(),
                properties(&layer, &feature),
            ));
        }
        out.push((
            layer.name().to_vec(),
            layer.version(),
            layer.extent(),
            features,
        ));
    }
    out
}

fn two_layer_tile() -> Vec<u8> {
    let mut tile = TileBuilder::new();
    {
        let mut layer = LayerBuilder::new(&mut tile, "roads");
        let mut fb = layer.linestring_feature();
        fb.set_id(1).unwrap();
        fb.add_linestring(3).unwrap();
        fb.set_point(3, 6).unwrap();
        fb.set_point(8, 12).unwrap();
        fb.set_point(5, 10).unwrap();
        fb.add_property("kind", "highway").unwrap();
        fb.add_property("lanes", 4u32).unwrap();
        fb.commit().unwrap();

        let mut fb = layer.linestring_feature();
        fb.add_linestring(2).unwrap();
        fb.set_point(0, 0).unwrap();
        fb.set_point(1, 1).unwrap();
        fb.add_property("kind", "path").unwrap();
        fb.commit().unwrap();
    }
    {
        let mut layer = LayerBuilder::with_params(&mut tile, "areas", 2, 8192);
        let mut fb = layer.polygon_feature();
        fb.set_id(9).unwrap();
        fb.add_ring(5).unwrap();
        for [x, y] in [[0, 0], [10, 0], [10, 10], [0, 10]] {
            fb.set_point(x, y).unwrap();
        }
        fb.close_ring().unwrap();
        fb.add_property("kind", "park").unwrap();
        fb.commit().unwrap();
    }
    tile.serialize()
}

#[test]
fn reencoding_a_decoded_tile_preserves_everything() {
    let original = two_layer_tile();

    // copy feature by feature into a fresh tile
    let mut copy = TileBuilder::new();
    let mut reader = TileReader::new(&original);
    while let Some(layer) = reader.next_layer() {
        let mut src = layer.unwrap();
        let name = String::from_utf8(src.name().to_vec()).unwrap();
        let mut dst = LayerBuilder::with_params(&mut copy, &name, src.version(), src.extent());
        while let Some(feature) = src.next_feature() {
            dst.add_feature(&src, &feature.unwrap()).unwrap();
        }
        dst.finish();
    }
    let copied = copy.serialize();

    assert_eq!(shape(&original), shape(&copied));
}

#[test]
fn existing_layers_pass_through_byte_identical() {
    let original = two_layer_tile();

    let mut copy = TileBuilder::new();
    let mut reader = TileReader::new(&original);
    while let Some(layer) = reader.next_layer() {
        copy.add_existing_layer(&layer.unwrap());
    }
    assert_eq!(copy.serialize(), original);
}
