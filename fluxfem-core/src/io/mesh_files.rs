//! Triangle mesh file formats (`.poly`, `.node`, `.ele`, `.edge`, `.pbc`).
//!
//! Markers pack a (boundary or point property, conductor) pair as
//! `(conductor + 1) * 0x10000 + (property + 2)`, with -1 standing for "none".
//! Packed markers exist only in the PSLG and in these files; the readers
//! decode them immediately.

use crate::error::{Error, Result};
use crate::mesh::pslg::Pslg;
use crate::mesh::{MeshNode, PeriodicKind, PeriodicPair};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const MARKER_BASE: i64 = 0x10000;

/// Pack a property index and a conductor index into one marker.
pub fn pack_marker(property: Option<usize>, conductor: Option<usize>) -> i64 {
    let p = property.map_or(-1, |p| p as i64);
    let c = conductor.map_or(-1, |c| c as i64);
    (c + 1) * MARKER_BASE + (p + 2)
}

/// Invert [`pack_marker`]. Zero and negative markers decode to nothing.
pub fn unpack_marker(marker: i64) -> (Option<usize>, Option<usize>) {
    if marker <= 0 {
        return (None, None);
    }
    let p = marker % MARKER_BASE - 2;
    let c = marker / MARKER_BASE - 1;
    let opt = |v: i64| if v >= 0 { Some(v as usize) } else { None };
    (opt(p), opt(c))
}

/// Node markers: positive markers carry a point property and a conductor,
/// negative ones were inherited from a segment and carry only the conductor.
pub fn decode_node_marker(marker: i64) -> (Option<usize>, Option<usize>) {
    if marker >= 0 {
        unpack_marker(marker)
    } else {
        (None, unpack_marker(-marker).1)
    }
}

/// Edge markers decode through their magnitude into (boundary, conductor).
pub fn decode_edge_marker(marker: i64) -> (Option<usize>, Option<usize>) {
    unpack_marker(marker.abs())
}

/// Write the PSLG in Triangle's `.poly` format.
pub fn write_poly(path: &Path, pslg: &Pslg) -> Result<()> {
    let mut out = String::new();
    poly_text(&mut out, pslg).map_err(std::io::Error::other)?;
    fs::write(path, out)?;
    Ok(())
}

/// Write matched periodic point pairs.
pub fn write_pbc(path: &Path, pairs: &[(usize, usize, PeriodicKind)]) -> Result<()> {
    let mut out = String::new();
    pbc_text(&mut out, pairs).map_err(std::io::Error::other)?;
    fs::write(path, out)?;
    Ok(())
}

fn poly_text(out: &mut String, pslg: &Pslg) -> std::fmt::Result {
    writeln!(out, "{} 2 0 1", pslg.points.len())?;
    for (i, p) in pslg.points.iter().enumerate() {
        writeln!(out, "{} {:.17e} {:.17e} {}", i, p.position.x, p.position.y, p.marker)?;
    }
    writeln!(out, "{} 1", pslg.segments.len())?;
    for (i, s) in pslg.segments.iter().enumerate() {
        writeln!(out, "{} {} {} {}", i, s.a, s.b, s.marker)?;
    }
    writeln!(out, "{}", pslg.holes.len())?;
    for (i, h) in pslg.holes.iter().enumerate() {
        writeln!(out, "{} {:.17e} {:.17e}", i, h.x, h.y)?;
    }
    writeln!(out, "{}", pslg.regions.len())?;
    for (i, r) in pslg.regions.iter().enumerate() {
        let area = r.max_area.filter(|a| *a > 0.0).unwrap_or(-1.0);
        writeln!(
            out,
            "{} {:.17e} {:.17e} {} {:e}",
            i, r.position.x, r.position.y, r.attribute, area
        )?;
    }
    Ok(())
}

fn pbc_text(out: &mut String, pairs: &[(usize, usize, PeriodicKind)]) -> std::fmt::Result {
    writeln!(out, "{}", pairs.len())?;
    for (i, &(a, b, kind)) in pairs.iter().enumerate() {
        let code = match kind {
            PeriodicKind::Periodic => 0,
            PeriodicKind::Antiperiodic => 1,
        };
        writeln!(out, "{} {} {} {}", i, a, b, code)?;
    }
    Ok(())
}

/// Non-empty, comment-stripped lines split into fields, with 1-based line numbers.
fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.split('#').next().unwrap_or("");
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            None
        } else {
            Some((i + 1, fields))
        }
    })
}

fn field<T: std::str::FromStr>(
    fields: &[&str],
    k: usize,
    line: usize,
    bad: fn(String) -> Error,
) -> Result<T> {
    fields
        .get(k)
        .and_then(|s| s.parse::<T>().ok())
        .ok_or_else(|| bad(format!("line {}: missing or malformed field {}", line, k + 1)))
}

/// Lines of a counted file: header fields, then data records.
fn counted<'a>(
    text: &'a str,
    bad: fn(String) -> Error,
) -> Result<(Vec<&'a str>, Vec<(usize, Vec<&'a str>)>)> {
    let mut it = records(text);
    let (line, header) = it.next().ok_or_else(|| bad("file is empty".into()))?;
    let count: usize = field(&header, 0, line, bad)?;
    let rows: Vec<(usize, Vec<&str>)> = it.take(count).collect();
    if rows.len() != count {
        return Err(bad(format!(
            "header announces {} records but {} were found",
            count,
            rows.len()
        )));
    }
    Ok((header, rows))
}

fn detect_base(rows: &[(usize, Vec<&str>)], bad: fn(String) -> Error) -> Result<usize> {
    match rows.first() {
        None => Ok(0),
        Some((line, f)) => match field::<usize>(f, 0, *line, bad)? {
            0 => Ok(0),
            1 => Ok(1),
            other => Err(bad(format!("first record has index {}", other))),
        },
    }
}

/// Nodes and the index base the triangulator used.
pub fn read_nodes(path: &Path) -> Result<(Vec<MeshNode>, usize)> {
    let bad = Error::BadNodeFile;
    let text = fs::read_to_string(path)
        .map_err(|e| Error::BadNodeFile(format!("{}: {}", path.display(), e)))?;
    let (header, rows) = counted(&text, bad)?;
    let n_attr: usize = field(&header, 2, 1, bad).unwrap_or(0);
    let has_marker = field::<usize>(&header, 3, 1, bad).unwrap_or(0) > 0;
    let base = detect_base(&rows, bad)?;
    let mut nodes = Vec::with_capacity(rows.len());
    for (line, f) in &rows {
        let x: f64 = field(f, 1, *line, bad)?;
        let y: f64 = field(f, 2, *line, bad)?;
        let mut node = MeshNode::new(x, y);
        if has_marker {
            let marker: i64 = field(f, 3 + n_attr, *line, bad)?;
            let (pp, cond) = decode_node_marker(marker);
            node.point_property = pp;
            node.conductor = cond;
        }
        nodes.push(node);
    }
    Ok((nodes, base))
}

/// Element corners and region attributes (0 when the element is in no region).
pub fn read_elements(path: &Path, base: usize, n_nodes: usize) -> Result<Vec<([usize; 3], usize)>> {
    let bad = Error::BadElementFile;
    let text = fs::read_to_string(path)
        .map_err(|e| Error::BadElementFile(format!("{}: {}", path.display(), e)))?;
    let (header, rows) = counted(&text, bad)?;
    let corners: usize = field(&header, 1, 1, bad)?;
    if corners != 3 {
        return Err(bad(format!("expected 3 nodes per triangle, found {}", corners)));
    }
    let n_attr: usize = field(&header, 2, 1, bad).unwrap_or(0);
    let mut out = Vec::with_capacity(rows.len());
    for (line, f) in &rows {
        let mut nodes = [0usize; 3];
        for (k, slot) in nodes.iter_mut().enumerate() {
            let raw: usize = field(f, 1 + k, *line, bad)?;
            *slot = raw
                .checked_sub(base)
                .filter(|&n| n < n_nodes)
                .ok_or_else(|| bad(format!("line {}: node {} out of range", line, raw)))?;
        }
        let attribute = if n_attr > 0 {
            let a: f64 = field(f, 4, *line, bad)?;
            a.round().max(0.0) as usize
        } else {
            0
        };
        out.push((nodes, attribute));
    }
    Ok(out)
}

/// Edges with their signed packed markers.
pub fn read_edges(path: &Path, base: usize, n_nodes: usize) -> Result<Vec<(usize, usize, i64)>> {
    let bad = Error::BadEdgeFile;
    let text = fs::read_to_string(path)
        .map_err(|e| Error::BadEdgeFile(format!("{}: {}", path.display(), e)))?;
    let (header, rows) = counted(&text, bad)?;
    let has_marker = field::<usize>(&header, 1, 1, bad).unwrap_or(0) > 0;
    let mut out = Vec::with_capacity(rows.len());
    for (line, f) in &rows {
        let mut ends = [0usize; 2];
        for (k, slot) in ends.iter_mut().enumerate() {
            let raw: usize = field(f, 1 + k, *line, bad)?;
            *slot = raw
                .checked_sub(base)
                .filter(|&n| n < n_nodes)
                .ok_or_else(|| bad(format!("line {}: node {} out of range", line, raw)))?;
        }
        let marker: i64 = if has_marker { field(f, 3, *line, bad)? } else { 0 };
        out.push((ends[0], ends[1], marker));
    }
    Ok(out)
}

/// Periodic pairs (0 = periodic, 1 = antiperiodic).
pub fn read_pbc(path: &Path, n_nodes: usize) -> Result<Vec<PeriodicPair>> {
    let bad = Error::BadPeriodicFile;
    let text = fs::read_to_string(path)
        .map_err(|e| Error::BadPeriodicFile(format!("{}: {}", path.display(), e)))?;
    let (_, rows) = counted(&text, bad)?;
    let mut out = Vec::with_capacity(rows.len());
    for (line, f) in &rows {
        let a: usize = field(f, 1, *line, bad)?;
        let b: usize = field(f, 2, *line, bad)?;
        let kind = match field::<u8>(f, 3, *line, bad)? {
            0 => PeriodicKind::Periodic,
            1 => PeriodicKind::Antiperiodic,
            other => return Err(bad(format!("line {}: unknown pair type {}", line, other))),
        };
        if a >= n_nodes || b >= n_nodes {
            return Err(bad(format!("line {}: pair ({}, {}) out of range", line, a, b)));
        }
        out.push(PeriodicPair { a, b, kind });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::pslg::{PslgPoint, PslgRegion, PslgSegment};
    use crate::types::Point2;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fluxfem-files-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_pack_round_trip() {
        for &b in &[-1i64, 0, 1, 2, 17, 4095, 65533] {
            for &c in &[-1i64, 0, 1, 300, 65533] {
                let ob = if b < 0 { None } else { Some(b as usize) };
                let oc = if c < 0 { None } else { Some(c as usize) };
                assert_eq!(unpack_marker(pack_marker(ob, oc)), (ob, oc), "b={} c={}", b, c);
            }
        }
        assert_eq!(pack_marker(None, None), 1);
        assert_eq!(pack_marker(Some(0), Some(0)), 0x10002);
    }

    #[test]
    fn test_node_and_edge_decoding() {
        let seg = pack_marker(Some(3), Some(1));
        assert_eq!(decode_node_marker(0), (None, None));
        assert_eq!(decode_node_marker(-seg), (None, Some(1)));
        assert_eq!(decode_node_marker(pack_marker(Some(2), None)), (Some(2), None));
        assert_eq!(decode_edge_marker(-seg), (Some(3), Some(1)));
        assert_eq!(decode_edge_marker(1), (None, None));
    }

    #[test]
    fn test_read_one_based_files() {
        let dir = scratch("onebased");
        let node = dir.join("m.node");
        fs::write(&node, "# header\n3 2 0 1\n1 0 0 1\n2 1 0 -65538\n3 0 1 0\n").unwrap();
        let (nodes, base) = read_nodes(&node).unwrap();
        assert_eq!(base, 1);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].conductor, Some(0));

        let ele = dir.join("m.ele");
        fs::write(&ele, "1 3 1\n1 1 2 3 2.0\n").unwrap();
        let elements = read_elements(&ele, base, nodes.len()).unwrap();
        assert_eq!(elements, vec![([0, 1, 2], 2)]);

        let edge = dir.join("m.edge");
        fs::write(&edge, "1 1\n1 1 2 -2\n").unwrap();
        let edges = read_edges(&edge, base, nodes.len()).unwrap();
        assert_eq!(edges, vec![(0, 1, -2)]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_files() {
        let dir = scratch("bad");
        let node = dir.join("m.node");
        fs::write(&node, "4 2 0 1\n0 0 0 1\n1 1 0 1\n").unwrap();
        assert!(matches!(read_nodes(&node), Err(Error::BadNodeFile(_))));

        let ele = dir.join("m.ele");
        fs::write(&ele, "1 3 0\n0 0 1 9\n").unwrap();
        assert!(matches!(read_elements(&ele, 0, 3), Err(Error::BadElementFile(_))));

        assert!(matches!(
            read_edges(&dir.join("missing.edge"), 0, 3),
            Err(Error::BadEdgeFile(_))
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_poly_and_pbc_writers() {
        let dir = scratch("writers");
        let pslg = Pslg {
            points: vec![
                PslgPoint { position: Point2::new(0.0, 0.0), marker: 1 },
                PslgPoint { position: Point2::new(1.0, 0.0), marker: 1 },
                PslgPoint { position: Point2::new(0.0, 1.0), marker: 1 },
            ],
            segments: vec![
                PslgSegment { a: 0, b: 1, marker: -2 },
                PslgSegment { a: 1, b: 2, marker: -2 },
                PslgSegment { a: 2, b: 0, marker: -2 },
            ],
            holes: vec![],
            regions: vec![PslgRegion {
                position: Point2::new(0.2, 0.2),
                attribute: 1,
                max_area: None,
            }],
            periodic: vec![],
        };
        let poly = dir.join("m.poly");
        write_poly(&poly, &pslg).unwrap();
        let text = fs::read_to_string(&poly).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "3 2 0 1");
        assert_eq!(lines[4], "3 1");
        assert!(lines[5].ends_with(" -2"));
        assert_eq!(lines[8], "0");
        assert_eq!(lines[9], "1");

        let pbc = dir.join("m.pbc");
        write_pbc(&pbc, &[(0, 2, PeriodicKind::Antiperiodic)]).unwrap();
        assert_eq!(fs::read_to_string(&pbc).unwrap(), "1\n0 0 2 1\n");
        let pairs = read_pbc(&pbc, 3).unwrap();
        assert_eq!(
            pairs,
            vec![PeriodicPair { a: 0, b: 2, kind: PeriodicKind::Antiperiodic }]
        );
        fs::remove_dir_all(&dir).ok();
    }
}
