//! Binary PLY in the layout splat viewers expect: a single `vertex` element
//! with 17 float32 properties,
//! `x y z nx ny nz f_dc_0 f_dc_1 f_dc_2 opacity scale_0 scale_1 scale_2
//! rot_0 rot_1 rot_2 rot_3`.
//!
//! Attributes are stored raw (pre-activation): `opacity` is the logit,
//! `scale_*` the log-scale, `rot_*` the unnormalized w-x-y-z quaternion and
//! `f_dc_*` the SH0 coefficient. Normals are zero-filled, kept only for
//! format compatibility.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::Vec3;

use scene::Splats;
use scene::activation::SH_C0;

use crate::error::{DatasetError, FormatError};
use crate::point_cloud::PointCloud;

/// Raw opacity written for never-optimized point clouds; far on the opaque
/// side of the sigmoid.
pub const PLAIN_OPACITY: f32 = 100.0;

/// Log-scale written for never-optimized point clouds; exp(-4) is a small
/// conservative splat.
pub const PLAIN_LOG_SCALE: f32 = -4.0;

const SPLAT_PROPERTIES: [&str; 17] = [
    "x", "y", "z", "nx", "ny", "nz", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0",
    "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::Char,
            "uchar" | "uint8" => Self::UChar,
            "short" | "int16" => Self::Short,
            "ushort" | "uint16" => Self::UShort,
            "int" | "int32" => Self::Int,
            "uint" | "uint32" => Self::UInt,
            "float" | "float32" => Self::Float,
            "double" | "float64" => Self::Double,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// Decode one little-endian scalar at `bytes` as f32.
    fn read_f32(self, bytes: &[u8]) -> f32 {
        match self {
            Self::Char => bytes[0] as i8 as f32,
            Self::UChar => bytes[0] as f32,
            Self::Short => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::UShort => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::Int => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::UInt => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Double => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f32,
        }
    }
}

#[derive(Debug, Clone)]
struct Property {
    name: String,
    ty: ScalarType,
    offset: usize,
}

#[derive(Debug)]
struct VertexHeader {
    count: usize,
    properties: Vec<Property>,
    stride: usize,
}

impl VertexHeader {
    fn field(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn has(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

fn parse_header(reader: &mut impl Read) -> Result<VertexHeader, FormatError> {
    let mut lines = vec![];
    let mut line = Vec::new();
    // The header is ASCII lines terminated by '\n'; read byte-wise so the
    // binary payload right after `end_header` stays untouched.
    loop {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .map_err(|_| FormatError::MalformedHeader("unterminated header".to_owned()))?;
        if byte[0] == b'\n' {
            let text = String::from_utf8_lossy(&line).trim_end_matches('\r').to_owned();
            let done = text == "end_header";
            lines.push(text);
            line.clear();
            if done {
                break;
            }
        } else {
            line.push(byte[0]);
        }
    }

    let mut iter = lines.iter();
    if iter.next().map(String::as_str) != Some("ply") {
        return Err(FormatError::BadMagic);
    }

    let mut format_seen = false;
    let mut vertex: Option<VertexHeader> = None;
    let mut in_vertex = false;

    for line in iter {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                let flavor = tokens.next().unwrap_or_default();
                if flavor != "binary_little_endian" {
                    return Err(FormatError::UnsupportedFormat(flavor.to_owned()));
                }
                format_seen = true;
            }
            Some("comment") | Some("obj_info") => {}
            Some("element") => {
                let name = tokens.next().unwrap_or_default();
                if name == "vertex" {
                    if vertex.is_some() {
                        return Err(FormatError::MalformedHeader(
                            "duplicate vertex element".to_owned(),
                        ));
                    }
                    let count: usize = tokens
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| {
                            FormatError::MalformedHeader("bad vertex count".to_owned())
                        })?;
                    vertex = Some(VertexHeader {
                        count,
                        properties: vec![],
                        stride: 0,
                    });
                    in_vertex = true;
                } else {
                    if vertex.is_none() {
                        // The vertex block must come first so we can read it
                        // without skipping variable-size list data.
                        return Err(FormatError::UnsupportedFormat(format!(
                            "element `{name}` precedes vertex"
                        )));
                    }
                    in_vertex = false;
                }
            }
            Some("property") => {
                if !in_vertex {
                    continue;
                }
                let vertex = vertex.as_mut().expect("in_vertex implies vertex header");
                let ty_name = tokens.next().unwrap_or_default();
                if ty_name == "list" {
                    return Err(FormatError::UnsupportedFormat(
                        "list property on vertex element".to_owned(),
                    ));
                }
                let ty = ScalarType::parse(ty_name).ok_or_else(|| {
                    FormatError::MalformedHeader(format!("unknown property type `{ty_name}`"))
                })?;
                let name = tokens
                    .next()
                    .ok_or_else(|| {
                        FormatError::MalformedHeader("property without a name".to_owned())
                    })?
                    .to_owned();
                vertex.properties.push(Property {
                    name,
                    ty,
                    offset: vertex.stride,
                });
                vertex.stride += ty.size();
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(FormatError::MalformedHeader(format!(
                    "unexpected keyword `{other}`"
                )));
            }
            None => {}
        }
    }

    if !format_seen {
        return Err(FormatError::MalformedHeader("missing format line".to_owned()));
    }
    vertex.ok_or_else(|| FormatError::MalformedHeader("no vertex element".to_owned()))
}

fn read_vertex_block(
    reader: &mut impl Read,
    header: &VertexHeader,
) -> Result<Vec<u8>, DatasetError> {
    let expected = header.count * header.stride;
    let mut data = vec![0u8; expected];
    let mut filled = 0;
    while filled < expected {
        match reader.read(&mut data[filled..]) {
            Ok(0) => {
                return Err(FormatError::Truncated {
                    expected,
                    got: filled,
                }
                .into());
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(data)
}

fn write_header(w: &mut impl Write, count: usize) -> std::io::Result<()> {
    writeln!(w, "ply")?;
    writeln!(w, "format binary_little_endian 1.0")?;
    writeln!(w, "element vertex {count}")?;
    for name in SPLAT_PROPERTIES {
        writeln!(w, "property float {name}")?;
    }
    writeln!(w, "end_header")
}

fn write_record(w: &mut impl Write, fields: [f32; 17]) -> std::io::Result<()> {
    for f in fields {
        w.write_all(&f.to_le_bytes())?;
    }
    Ok(())
}

/// Write a never-optimized point cloud with conservative fixed attributes:
/// colors encoded as SH0, solid opacity, small uniform scale, identity
/// rotation. Point order is preserved.
pub fn write_point_cloud(cloud: &PointCloud, path: &Path) -> Result<(), DatasetError> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, cloud.len())?;

    for (pos, color) in cloud.positions().iter().zip(cloud.colors()) {
        let sh0 = (*color - 0.5) / SH_C0;
        write_record(
            &mut w,
            [
                pos.x,
                pos.y,
                pos.z,
                0.0,
                0.0,
                0.0,
                sh0.x,
                sh0.y,
                sh0.z,
                PLAIN_OPACITY,
                PLAIN_LOG_SCALE,
                PLAIN_LOG_SCALE,
                PLAIN_LOG_SCALE,
                1.0,
                0.0,
                0.0,
                0.0,
            ],
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Write a trained splat set: the raw per-splat attributes exactly as
/// stored, in store order.
pub fn write_splats(splats: &Splats, path: &Path) -> Result<(), DatasetError> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, splats.num_splats())?;

    for i in 0..splats.num_splats() {
        let pos = splats.means()[i];
        let sh0 = splats.sh0()[i];
        let scale = splats.log_scales()[i];
        let rot = splats.rotations()[i];
        write_record(
            &mut w,
            [
                pos.x,
                pos.y,
                pos.z,
                0.0,
                0.0,
                0.0,
                sh0.x,
                sh0.y,
                sh0.z,
                splats.raw_opacities()[i],
                scale.x,
                scale.y,
                scale.z,
                rot[0],
                rot[1],
                rot[2],
                rot[3],
            ],
        )?;
    }
    w.flush()?;
    Ok(())
}

fn get(record: &[u8], prop: &Property) -> f32 {
    prop.ty.read_f32(&record[prop.offset..])
}

/// Read a PLY back as positions plus resolved colors.
///
/// Color priority: direct `red/green/blue` (scaled from bytes when stored as
/// uchar), then `f_dc_*` decoded through the SH0 activation and clamped to
/// [0, 1], then a white fallback with a warning.
pub fn read_point_cloud(path: &Path) -> Result<PointCloud, DatasetError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;

    for required in ["x", "y", "z"] {
        if !header.has(required) {
            return Err(FormatError::MissingProperty(required).into());
        }
    }

    let data = read_vertex_block(&mut reader, &header)?;
    let (px, py, pz) = (
        header.field("x").expect("checked above").clone(),
        header.field("y").expect("checked above").clone(),
        header.field("z").expect("checked above").clone(),
    );

    let rgb = ["red", "green", "blue"].map(|n| header.field(n).cloned());
    let f_dc = ["f_dc_0", "f_dc_1", "f_dc_2"].map(|n| header.field(n).cloned());
    let has_rgb = rgb.iter().all(Option::is_some);
    let has_f_dc = f_dc.iter().all(Option::is_some);
    if !has_rgb && !has_f_dc {
        log::warn!("no color data in {}, using white", path.display());
    }

    let mut positions = Vec::with_capacity(header.count);
    let mut colors = Vec::with_capacity(header.count);

    for record in data.chunks_exact(header.stride) {
        positions.push(Vec3::new(get(record, &px), get(record, &py), get(record, &pz)));

        let color = if has_rgb {
            let channel = |p: &Property| {
                let v = get(record, p);
                // Byte-typed channels are 0-255; float channels are taken
                // as already normalized.
                if p.ty == ScalarType::Float || p.ty == ScalarType::Double {
                    v
                } else {
                    v / 255.0
                }
            };
            Vec3::new(
                channel(rgb[0].as_ref().expect("has_rgb")),
                channel(rgb[1].as_ref().expect("has_rgb")),
                channel(rgb[2].as_ref().expect("has_rgb")),
            )
        } else if has_f_dc {
            let sh0 = Vec3::new(
                get(record, f_dc[0].as_ref().expect("has_f_dc")),
                get(record, f_dc[1].as_ref().expect("has_f_dc")),
                get(record, f_dc[2].as_ref().expect("has_f_dc")),
            );
            (sh0 * SH_C0 + 0.5).clamp(Vec3::ZERO, Vec3::ONE)
        } else {
            Vec3::ONE
        };
        colors.push(color);
    }

    PointCloud::new(positions, colors)
}

/// Read the full raw splat attribute set back from a trained splat PLY.
pub fn read_splats(path: &Path) -> Result<Splats, DatasetError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let required = [
        "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "scale_2",
        "rot_0", "rot_1", "rot_2", "rot_3",
    ];
    for name in required {
        if !header.has(name) {
            return Err(FormatError::MissingProperty(name).into());
        }
    }
    let prop = |name: &str| header.field(name).expect("checked above").clone();

    let data = read_vertex_block(&mut reader, &header)?;

    let (px, py, pz) = (prop("x"), prop("y"), prop("z"));
    let dc = [prop("f_dc_0"), prop("f_dc_1"), prop("f_dc_2")];
    let opacity = prop("opacity");
    let sc = [prop("scale_0"), prop("scale_1"), prop("scale_2")];
    let rot = [prop("rot_0"), prop("rot_1"), prop("rot_2"), prop("rot_3")];

    let mut means = Vec::with_capacity(header.count);
    let mut sh0 = Vec::with_capacity(header.count);
    let mut raw_opacities = Vec::with_capacity(header.count);
    let mut log_scales = Vec::with_capacity(header.count);
    let mut rotations = Vec::with_capacity(header.count);

    for record in data.chunks_exact(header.stride) {
        means.push(Vec3::new(get(record, &px), get(record, &py), get(record, &pz)));
        sh0.push(Vec3::new(
            get(record, &dc[0]),
            get(record, &dc[1]),
            get(record, &dc[2]),
        ));
        raw_opacities.push(get(record, &opacity));
        log_scales.push(Vec3::new(
            get(record, &sc[0]),
            get(record, &sc[1]),
            get(record, &sc[2]),
        ));
        rotations.push([
            get(record, &rot[0]),
            get(record, &rot[1]),
            get(record, &rot[2]),
            get(record, &rot[3]),
        ]);
    }

    Splats::from_raw_parts(means, log_scales, rotations, raw_opacities, sh0)
        .map_err(DatasetError::Scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_cloud() -> PointCloud {
        PointCloud::new(
            vec![
                Vec3::new(0.0, 1.0, 2.0),
                Vec3::new(-1.0, 0.5, 3.0),
                Vec3::new(4.0, -2.0, 0.25),
            ],
            vec![
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::splat(0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn point_cloud_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let cloud = sample_cloud();
        write_point_cloud(&cloud, &path).unwrap();

        let back = read_point_cloud(&path).unwrap();
        assert_eq!(back.len(), 3);
        for i in 0..3 {
            assert!((back.positions()[i] - cloud.positions()[i]).length() < 1e-6);
            // Colors went through the SH0 encode/decode.
            assert!((back.colors()[i] - cloud.colors()[i]).length() < 1e-5);
        }
    }

    #[test]
    fn splat_roundtrip_is_identity_on_raw_attributes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("splats.ply");

        let points = vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-0.5, 0.0, 4.0)];
        let colors = vec![Vec3::splat(0.25), Vec3::new(0.9, 0.1, 0.4)];
        let mut splats = Splats::from_point_cloud(&points, &colors).unwrap();
        splats.rotations_mut()[1] = [0.7, 0.1, -0.2, 0.3];
        splats.raw_opacities_mut()[0] = -1.25;
        splats.log_scales_mut()[1] = Vec3::new(-3.0, -2.5, -4.0);

        write_splats(&splats, &path).unwrap();
        let back = read_splats(&path).unwrap();

        assert_eq!(back.num_splats(), splats.num_splats());
        for i in 0..splats.num_splats() {
            assert_eq!(back.means()[i], splats.means()[i]);
            assert_eq!(back.log_scales()[i], splats.log_scales()[i]);
            assert_eq!(back.rotations()[i], splats.rotations()[i]);
            assert_eq!(back.raw_opacities()[i], splats.raw_opacities()[i]);
            assert_eq!(back.sh0()[i], splats.sh0()[i]);
        }

        // Activations on the reloaded set stay physical.
        let act = back.activated();
        for i in 0..back.num_splats() {
            assert!(act.scales[i].min_element() > 0.0);
            assert!(act.opacities[i] > 0.0 && act.opacities[i] < 1.0);
            let norm: f32 = act.rotations[i].iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn plain_mode_writes_conservative_attributes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.ply");
        write_point_cloud(&sample_cloud(), &path).unwrap();

        let splats = read_splats(&path).unwrap();
        for i in 0..splats.num_splats() {
            assert_eq!(splats.raw_opacities()[i], PLAIN_OPACITY);
            assert_eq!(splats.log_scales()[i], Vec3::splat(PLAIN_LOG_SCALE));
            assert_eq!(splats.rotations()[i], [1.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn missing_positions_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.ply");
        let mut w = BufWriter::new(File::create(&path).unwrap());
        writeln!(w, "ply").unwrap();
        writeln!(w, "format binary_little_endian 1.0").unwrap();
        writeln!(w, "element vertex 1").unwrap();
        writeln!(w, "property float red").unwrap();
        writeln!(w, "property float green").unwrap();
        writeln!(w, "property float blue").unwrap();
        writeln!(w, "end_header").unwrap();
        w.write_all(&[0u8; 12]).unwrap();
        w.flush().unwrap();
        drop(w);

        assert!(matches!(
            read_point_cloud(&path),
            Err(DatasetError::Format(FormatError::MissingProperty("x")))
        ));
    }

    #[test]
    fn uchar_rgb_colors_resolve_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rgb.ply");
        let mut w = BufWriter::new(File::create(&path).unwrap());
        writeln!(w, "ply").unwrap();
        writeln!(w, "format binary_little_endian 1.0").unwrap();
        writeln!(w, "element vertex 1").unwrap();
        for p in ["x", "y", "z"] {
            writeln!(w, "property float {p}").unwrap();
        }
        for p in ["red", "green", "blue"] {
            writeln!(w, "property uchar {p}").unwrap();
        }
        // An f_dc field that must lose to direct rgb.
        writeln!(w, "property float f_dc_0").unwrap();
        writeln!(w, "property float f_dc_1").unwrap();
        writeln!(w, "property float f_dc_2").unwrap();
        writeln!(w, "end_header").unwrap();
        for v in [1.0f32, 2.0, 3.0] {
            w.write_all(&v.to_le_bytes()).unwrap();
        }
        w.write_all(&[255u8, 0, 128]).unwrap();
        for v in [9.0f32, 9.0, 9.0] {
            w.write_all(&v.to_le_bytes()).unwrap();
        }
        w.flush().unwrap();
        drop(w);

        let cloud = read_point_cloud(&path).unwrap();
        assert!((cloud.colors()[0] - Vec3::new(1.0, 0.0, 128.0 / 255.0)).length() < 1e-3);
    }

    #[test]
    fn truncated_payload_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.ply");
        let cloud = sample_cloud();
        write_point_cloud(&cloud, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(
            read_point_cloud(&path),
            Err(DatasetError::Format(FormatError::Truncated { .. }))
        ));
    }
}
