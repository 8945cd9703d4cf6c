//! Geometry command-stream decoder for MVT.
//!
//! A geometry is a packed sequence of uint32 command and parameter
//! integers. The decoder walks the stream and reports points, linestrings
//! or polygon rings to a caller-supplied [`GeomHandler`]; per-point
//! dispatch is monomorphized over the handler type.

use prost::encoding::decode_varint;

use crate::error::{Error, Result};

pub(crate) const GEOM_COMMAND_MOVE_TO: u32 = 1;
pub(crate) const GEOM_COMMAND_LINE_TO: u32 = 2;
pub(crate) const GEOM_COMMAND_CLOSE_PATH: u32 = 7;

pub(crate) const GEOM_COMMAND_MOVE_TO_WITH_COUNT1: u32 = 1 << 3 | GEOM_COMMAND_MOVE_TO;
pub(crate) const GEOM_COMMAND_CLOSE_PATH_WITH_COUNT1: u32 = 1 << 3 | GEOM_COMMAND_CLOSE_PATH;

/// Geometry type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeomType {
    #[default]
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

impl GeomType {
    pub(crate) fn from_raw(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(GeomType::Unknown),
            1 => Ok(GeomType::Point),
            2 => Ok(GeomType::Linestring),
            3 => Ok(GeomType::Polygon),
            _ => Err(Error::Format(format!("unknown geometry type {raw}"))),
        }
    }
}

/// One feature's geometry: its type and the raw command stream.
#[derive(Debug, Clone, Copy)]
pub struct Geometry<'a> {
    geom_type: GeomType,
    data: &'a [u8],
}

impl<'a> Geometry<'a> {
    pub fn new(geom_type: GeomType, data: &'a [u8]) -> Self {
        Self { geom_type, data }
    }

    pub fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    /// Raw packed command stream bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// Orientation of a decoded polygon ring, derived from the sign of its
/// shoelace sum in the tile's screen-aligned (y-down) coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    /// Positive shoelace sum: exterior ring.
    Outer,
    /// Negative shoelace sum: interior ring (hole).
    Inner,
    /// Zero shoelace sum (all points collinear).
    Degenerate,
}

/// Receiver for decoded geometry.
///
/// Only the method group matching the called entry point is invoked; all
/// methods default to no-ops so a handler implements just what it needs.
/// The count passed to the `*_begin` methods is the number of points the
/// primitive will emit, as declared by the command stream.
pub trait GeomHandler {
    fn points_begin(&mut self, _count: u32) {}
    fn points_point(&mut self, _p: [i32; 2]) {}
    fn points_end(&mut self) {}

    fn linestring_begin(&mut self, _count: u32) {}
    fn linestring_point(&mut self, _p: [i32; 2]) {}
    fn linestring_end(&mut self) {}

    fn ring_begin(&mut self, _count: u32) {}
    fn ring_point(&mut self, _p: [i32; 2]) {}
    fn ring_end(&mut self, _kind: RingKind) {}
}

/// Decodes a point geometry: exactly one MoveTo with count >= 1.
pub fn decode_point_geometry<H: GeomHandler>(
    geom: &Geometry<'_>,
    _strict: bool,
    handler: &mut H,
) -> Result<()> {
    expect_type(geom, GeomType::Point, "geometry is not a point geometry")?;
    let mut scan = CommandScanner::new(geom.data);
    let count = scan.command(GEOM_COMMAND_MOVE_TO)?;
    if count == 0 {
        return Err(Error::Geometry("MoveTo count must be at least 1 for points".into()));
    }
    handler.points_begin(count);
    for _ in 0..count {
        handler.points_point(scan.point()?);
    }
    handler.points_end();
    scan.expect_done()
}

/// Decodes a linestring geometry: one or more (MoveTo(1), LineTo(n>=1)) pairs.
pub fn decode_linestring_geometry<H: GeomHandler>(
    geom: &Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    expect_type(geom, GeomType::Linestring, "geometry is not a linestring geometry")?;
    let mut scan = CommandScanner::new(geom.data);
    loop {
        let count = scan.command(GEOM_COMMAND_MOVE_TO)?;
        if count != 1 {
            return Err(Error::Geometry(format!(
                "MoveTo count must be 1 for linestrings, got {count}"
            )));
        }
        let first = scan.point()?;
        let count = scan.command(GEOM_COMMAND_LINE_TO)?;
        if count == 0 {
            return Err(Error::Geometry("LineTo count must be at least 1 for linestrings".into()));
        }
        handler.linestring_begin(count + 1);
        handler.linestring_point(first);
        let mut prev = first;
        for _ in 0..count {
            let p = scan.point()?;
            if strict && p == prev {
                return Err(Error::Geometry(
                    "consecutive identical points in linestring (strict mode)".into(),
                ));
            }
            handler.linestring_point(p);
            prev = p;
        }
        handler.linestring_end();
        if scan.done() {
            return Ok(());
        }
    }
}

/// Decodes a polygon geometry: one or more (MoveTo(1), LineTo, ClosePath)
/// ring triples. The start point is re-emitted as the closing point and
/// each ring is classified by the sign of its shoelace sum.
pub fn decode_polygon_geometry<H: GeomHandler>(
    geom: &Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    expect_type(geom, GeomType::Polygon, "geometry is not a polygon geometry")?;
    let mut scan = CommandScanner::new(geom.data);
    loop {
        let count = scan.command(GEOM_COMMAND_MOVE_TO)?;
        if count != 1 {
            return Err(Error::Geometry(format!(
                "MoveTo count must be 1 for polygons, got {count}"
            )));
        }
        let start = scan.point()?;
        let count = scan.command(GEOM_COMMAND_LINE_TO)?;
        if count == 0 {
            return Err(Error::Geometry("LineTo count must be at least 1 for polygons".into()));
        }
        if strict && count == 1 {
            return Err(Error::Geometry(
                "LineTo count must be greater than 1 for polygon rings (strict mode)".into(),
            ));
        }
        handler.ring_begin(count + 2);
        handler.ring_point(start);
        let mut sum = 0i64;
        let mut prev = start;
        for _ in 0..count {
            let p = scan.point()?;
            if strict && p == prev {
                return Err(Error::Geometry(
                    "consecutive identical points in polygon ring (strict mode)".into(),
                ));
            }
            sum += det(prev, p);
            handler.ring_point(p);
            prev = p;
        }
        let count = scan.command(GEOM_COMMAND_CLOSE_PATH)?;
        if count != 1 {
            return Err(Error::Geometry(format!("ClosePath count must be 1, got {count}")));
        }
        sum += det(prev, start);
        handler.ring_point(start);
        handler.ring_end(match sum {
            s if s > 0 => RingKind::Outer,
            s if s < 0 => RingKind::Inner,
            _ => RingKind::Degenerate,
        });
        if scan.done() {
            return Ok(());
        }
    }
}

/// Decodes a geometry of any of the three concrete types.
pub fn decode_geometry<H: GeomHandler>(
    geom: &Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    match geom.geom_type {
        GeomType::Point => decode_point_geometry(geom, strict, handler),
        GeomType::Linestring => decode_linestring_geometry(geom, strict, handler),
        GeomType::Polygon => decode_polygon_geometry(geom, strict, handler),
        GeomType::Unknown => Err(Error::Type("unknown geometry type cannot be decoded")),
    }
}

fn expect_type(geom: &Geometry<'_>, want: GeomType, msg: &'static str) -> Result<()> {
    if geom.geom_type != want {
        return Err(Error::Type(msg));
    }
    Ok(())
}

/// 2x2 determinant term of the shoelace sum.
fn det(a: [i32; 2], b: [i32; 2]) -> i64 {
    a[0] as i64 * b[1] as i64 - b[0] as i64 * a[1] as i64
}

/// Varint scanner over a command stream, tracking the running cursor.
struct CommandScanner<'a> {
    buf: &'a [u8],
    cursor: [i32; 2],
}

impl<'a> CommandScanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: [0, 0] }
    }

    fn done(&self) -> bool {
        self.buf.is_empty()
    }

    fn expect_done(&self) -> Result<()> {
        if !self.done() {
            return Err(Error::Geometry("additional data after end of geometry".into()));
        }
        Ok(())
    }

    /// Reads a command integer, checks its id, returns its count.
    fn command(&mut self, expected: u32) -> Result<u32> {
        let raw = self.read_u32("command")?;
        let id = raw & 0x7;
        if id != expected {
            return Err(Error::Geometry(format!("expected command {expected}, got {id}")));
        }
        Ok(raw >> 3)
    }

    /// Reads a parameter pair and advances the cursor.
    fn point(&mut self) -> Result<[i32; 2]> {
        let dx = unzigzag(self.read_u32("parameter")?);
        let dy = unzigzag(self.read_u32("parameter")?);
        self.cursor = [self.cursor[0].wrapping_add(dx), self.cursor[1].wrapping_add(dy)];
        Ok(self.cursor)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        if self.buf.is_empty() {
            return Err(Error::Geometry(format!(
                "unexpected end of buffer while reading {what}"
            )));
        }
        let v = decode_varint(&mut self.buf)
            .map_err(|_| Error::Geometry("invalid varint in geometry".into()))?;
        u32::try_from(v).map_err(|_| Error::Geometry(format!("{what} integer out of range: {v}")))
    }
}

/// zig-zag encoding
///
/// See: https://protobuf.dev/programming-guides/encoding/#signed-ints
#[inline]
pub(crate) fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// zig-zag decoding
#[inline]
pub(crate) fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ (-((v & 1) as i32))
}
