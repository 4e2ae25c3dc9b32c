//! Decoding of tile payloads and the extremes file format.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::config::{DataType, Endianness};
use crate::coords::Sector;
use crate::error::DecodeError;

/// Decodes raw-binary samples in the declared data type and byte order.
///
/// The payload must hold exactly `expected` samples; a short or oversized
/// payload is a decode failure, and no partial tile is ever produced.
pub fn decode_raw(
    bytes: &[u8],
    data_type: DataType,
    byte_order: Endianness,
    expected: usize,
) -> Result<Vec<f64>, DecodeError> {
    let sample_size = data_type.size();
    if bytes.len() != expected * sample_size {
        return Err(DecodeError::Truncated {
            expected,
            actual: bytes.len() / sample_size,
        });
    }

    let mut cursor = Cursor::new(bytes);
    let mut values = Vec::with_capacity(expected);
    for _ in 0..expected {
        let value = match (data_type, byte_order) {
            (DataType::Int8, _) => cursor.read_i8()? as f64,
            (DataType::Int16, Endianness::Big) => cursor.read_i16::<BigEndian>()? as f64,
            (DataType::Int16, Endianness::Little) => cursor.read_i16::<LittleEndian>()? as f64,
            (DataType::Int32, Endianness::Big) => cursor.read_i32::<BigEndian>()? as f64,
            (DataType::Int32, Endianness::Little) => cursor.read_i32::<LittleEndian>()? as f64,
            (DataType::Float32, Endianness::Big) => cursor.read_f32::<BigEndian>()? as f64,
            (DataType::Float32, Endianness::Little) => cursor.read_f32::<LittleEndian>()? as f64,
            (DataType::Float64, Endianness::Big) => cursor.read_f64::<BigEndian>()?,
            (DataType::Float64, Endianness::Little) => cursor.read_f64::<LittleEndian>()?,
        };
        values.push(value);
    }
    Ok(values)
}

/// A decoded gridded raster: samples already flipped to the engine's
/// south-to-north row order, plus the sector derived from the raster's
/// georeferencing metadata.
#[derive(Clone, Debug)]
pub struct GriddedTile {
    pub samples: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub sector: Sector,
}

/// Decodes a GeoTIFF elevation tile.
///
/// The sector comes from the `ModelTiepoint`/`ModelPixelScale` tags: the
/// tiepoint anchors the top-left raster corner at a geographic position and
/// the pixel scale spans the grid from there.
pub fn decode_geotiff(bytes: &[u8]) -> Result<GriddedTile, DecodeError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| DecodeError::MissingGeoTags)?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| DecodeError::MissingGeoTags)?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(DecodeError::MissingGeoTags);
    }

    // Tiepoint maps raster (i, j) to geographic (x, y); the usual anchor is
    // the top-left corner, i.e. the sector's NW point.
    let max_lat = tiepoint[4] + tiepoint[1] * scale[1];
    let min_lon = tiepoint[3] - tiepoint[0] * scale[0];
    let sector = Sector::new(
        max_lat - scale[1] * height as f64,
        max_lat,
        min_lon,
        min_lon + scale[0] * width as f64,
    );

    let top_down: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F64(v) => v,
        _ => return Err(DecodeError::UnsupportedSampleFormat),
    };
    if top_down.len() != width * height {
        return Err(DecodeError::Truncated {
            expected: width * height,
            actual: top_down.len(),
        });
    }

    // TIFF rows run north to south; flip to the engine's convention.
    let mut samples = Vec::with_capacity(top_down.len());
    for row in (0..height).rev() {
        samples.extend_from_slice(&top_down[row * width..(row + 1) * width]);
    }

    Ok(GriddedTile {
        samples,
        width,
        height,
        sector,
    })
}

/// Reads an extremes file: big-endian `i16` [min, max] pairs, row-major.
pub fn read_extremes<R: Read>(mut reader: R) -> Result<Vec<(i16, i16)>, std::io::Error> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let mut cursor = Cursor::new(&bytes);
    let mut pairs = Vec::with_capacity(bytes.len() / 4);
    for _ in 0..bytes.len() / 4 {
        let min = cursor.read_i16::<BigEndian>()?;
        let max = cursor.read_i16::<BigEndian>()?;
        pairs.push((min, max));
    }
    Ok(pairs)
}

/// Writes an extremes file in the same layout `read_extremes` consumes.
pub fn write_extremes<W: Write>(mut writer: W, pairs: &[(i16, i16)]) -> Result<(), std::io::Error> {
    for &(min, max) in pairs {
        writer.write_i16::<BigEndian>(min)?;
        writer.write_i16::<BigEndian>(max)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_int16_big_endian() {
        let bytes = [0x00, 0x64, 0xff, 0x9c, 0x80, 0x00, 0x00, 0x00];
        let values = decode_raw(&bytes, DataType::Int16, Endianness::Big, 4).unwrap();
        assert_eq!(values, vec![100.0, -100.0, -32768.0, 0.0]);
    }

    #[test]
    fn raw_int16_little_endian() {
        let bytes = [0x64, 0x00, 0x9c, 0xff];
        let values = decode_raw(&bytes, DataType::Int16, Endianness::Little, 2).unwrap();
        assert_eq!(values, vec![100.0, -100.0]);
    }

    #[test]
    fn raw_float32_round_trips() {
        let mut bytes = Vec::new();
        for value in [1.5f32, -2.25, 0.0] {
            bytes.write_f32::<LittleEndian>(value).unwrap();
        }
        let values = decode_raw(&bytes, DataType::Float32, Endianness::Little, 3).unwrap();
        assert_eq!(values, vec![1.5, -2.25, 0.0]);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = [0x00, 0x64, 0xff];
        let result = decode_raw(&bytes, DataType::Int16, Endianness::Big, 2);
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn extremes_round_trip() {
        let pairs = vec![(-100i16, 250), (0, 0), (i16::MIN, i16::MAX)];
        let mut bytes = Vec::new();
        write_extremes(&mut bytes, &pairs).unwrap();
        assert_eq!(bytes.len(), pairs.len() * 4);
        assert_eq!(read_extremes(Cursor::new(bytes)).unwrap(), pairs);
    }
}
