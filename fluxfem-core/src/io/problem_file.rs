//! Problem file reader (`.fem`, `.fee`, `.feh`, `.fec`).
//!
//! The file is a sequence of `[key] = value` header lines, counted property
//! sections holding `<BeginX> ... <EndX>` records, and counted geometry
//! sections holding one whitespace-separated record per line. Keys are
//! case-insensitive. Node references in geometry records are 0-based;
//! property, circuit and conductor references are 1-based with 0 meaning
//! none. A trailing `[solution]` section is ignored.

use super::records::{self, PropertyRecord};
use crate::error::{Error, Result};
use crate::problem::{
    ArcSegment, BlockLabel, Coordinates, Domain, MagDirection, Node, Problem, Properties, Region,
    Segment,
};
use crate::types::{LengthUnit, ProblemType};
use std::path::Path;

/// Read a problem file, taking the domain from its extension.
pub fn read_problem(path: &Path) -> Result<Problem> {
    let domain = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(Domain::from_extension)
        .ok_or_else(|| {
            Error::InvalidQuery(format!(
                "cannot tell the problem domain from the file name {}",
                path.display()
            ))
        })?;
    let text = std::fs::read_to_string(path)?;
    log::debug!("reading {:?} problem from {}", domain, path.display());
    parse_problem(&text, domain)
}

/// Parse problem file text for the given domain.
pub fn parse_problem(text: &str, domain: Domain) -> Result<Problem> {
    let mut reader = Reader::new(text);
    let mut problem = Problem::new(domain);

    while let Some((line_no, line)) = reader.next_line() {
        let Some((key, value)) = split_header(line) else {
            return Err(Error::parse(line_no, format!("unexpected line `{}`", line)));
        };
        match key.as_str() {
            "solution" => break,
            "format" => problem.header.format = number(line_no, &value)?,
            "frequency" => {
                if domain == Domain::Heat {
                    return Err(Error::parse(line_no, "heat flow problems have no frequency"));
                }
                problem.header.frequency = number(line_no, &value)?;
            }
            "precision" => problem.header.precision = number(line_no, &value)?,
            "minangle" => problem.header.min_angle = number(line_no, &value)?,
            "depth" => problem.header.depth = number(line_no, &value)?,
            "dt" => problem.header.dt = number(line_no, &value)?,
            "lengthunits" => {
                problem.header.length_units = LengthUnit::from_name(&unquote(&value))
                    .ok_or_else(|| Error::parse(line_no, format!("unknown length unit {}", value)))?
            }
            "problemtype" => {
                problem.header.problem_type = match unquote(&value).to_ascii_lowercase().as_str() {
                    "planar" => ProblemType::Planar,
                    "axisymmetric" | "axi" => ProblemType::Axisymmetric,
                    other => {
                        return Err(Error::parse(line_no, format!("unknown problem type {}", other)))
                    }
                }
            }
            "coordinates" => {
                problem.header.coordinates = match unquote(&value).to_ascii_lowercase().as_str() {
                    "cartesian" => Coordinates::Cartesian,
                    "polar" => Coordinates::Polar,
                    other => {
                        return Err(Error::parse(line_no, format!("unknown coordinates {}", other)))
                    }
                }
            }
            "extzo" => problem.header.exterior.zo = number(line_no, &value)?,
            "extro" => problem.header.exterior.ro = number(line_no, &value)?,
            "extri" => problem.header.exterior.ri = number(line_no, &value)?,
            "comment" => problem.header.comment = unquote(&value),
            "pointprops" | "bdryprops" | "blockprops" | "circuitprops" | "conductorprops" => {
                let recs = reader.records(&key, count(line_no, &value)?)?;
                add_records(&mut problem.properties, &key, &recs, line_no)?;
            }
            "numpoints" => {
                for (n, fields) in reader.rows(&key, count(line_no, &value)?)? {
                    problem.geometry.nodes.push(node(domain, n, &fields)?);
                }
            }
            "numsegments" => {
                for (n, fields) in reader.rows(&key, count(line_no, &value)?)? {
                    problem.geometry.segments.push(segment(domain, n, &fields)?);
                }
            }
            "numarcsegments" => {
                for (n, fields) in reader.rows(&key, count(line_no, &value)?)? {
                    problem.geometry.arcs.push(arc(domain, n, &fields)?);
                }
            }
            "numholes" => {
                for (n, fields) in reader.rows(&key, count(line_no, &value)?)? {
                    let [x, y] = floats::<2>(n, &fields)?;
                    let mut label = BlockLabel::new(x, y, Region::NoMesh);
                    label.group = int_at(n, &fields, 2, 0)? as i32;
                    problem.geometry.labels.push(label);
                }
            }
            "numblocklabels" => {
                for (n, fields) in reader.rows(&key, count(line_no, &value)?)? {
                    problem.geometry.labels.push(label(domain, n, &fields)?);
                }
            }
            "acsolver" | "prevsoln" | "prevtype" | "dosmartmesh" | "smartmesh" | "forcemaxmesh" => {
                log::debug!("ignoring [{}] at line {}", key, line_no);
            }
            _ => log::warn!("unknown key [{}] at line {} ignored", key, line_no),
        }
    }
    log::info!(
        "loaded {:?} problem: {} nodes, {} segments, {} arcs, {} labels",
        domain,
        problem.geometry.nodes.len(),
        problem.geometry.segments.len(),
        problem.geometry.arcs.len(),
        problem.geometry.labels.len()
    );
    Ok(problem)
}

/// Line cursor over the file, skipping blank lines.
struct Reader<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    /// Next non-blank line with its 1-based number.
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim();
            self.pos += 1;
            if !line.is_empty() {
                return Some((self.pos, line));
            }
        }
        None
    }

    fn peek_line(&self) -> Option<&'a str> {
        self.lines[self.pos.min(self.lines.len())..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }

    /// `count` data rows of a geometry section.
    fn rows(&mut self, section: &str, count: usize) -> Result<Vec<(usize, Vec<&'a str>)>> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            match self.peek_line() {
                Some(l) if !l.starts_with('[') => {
                    let Some((n, line)) = self.next_line() else { break };
                    out.push((n, line.split_whitespace().collect()));
                }
                _ => break,
            }
        }
        if out.len() != count {
            return Err(Error::RecordCount {
                section: section.to_string(),
                expected: count,
                found: out.len(),
            });
        }
        Ok(out)
    }

    /// `count` property records of a property section.
    fn records(&mut self, section: &str, count: usize) -> Result<Vec<PropertyRecord>> {
        let mut out = Vec::with_capacity(count);
        let mut current: Option<PropertyRecord> = None;
        while out.len() < count {
            match self.peek_line() {
                Some(l) if l.starts_with('<') => {}
                _ => break,
            }
            let Some((n, line)) = self.next_line() else { break };
            let Some((tag, value)) = split_tag(line) else {
                return Err(Error::parse(n, format!("malformed property line `{}`", line)));
            };
            if tag.starts_with("begin") {
                current = Some(PropertyRecord {
                    line: n,
                    ..Default::default()
                });
            } else if tag.starts_with("end") {
                let rec = current
                    .take()
                    .ok_or_else(|| Error::parse(n, format!("<{}> without a matching begin", tag)))?;
                out.push(rec);
            } else {
                let rec = current
                    .as_mut()
                    .ok_or_else(|| Error::parse(n, format!("<{}> outside a property record", tag)))?;
                if tag == "bhpoints" || tag == "tkpoints" {
                    let m = self::count(n, &value)?;
                    for _ in 0..m {
                        let Some((pn, pl)) = self.next_line() else {
                            return Err(Error::parse(n, format!("<{}> list ends early", tag)));
                        };
                        let fields: Vec<&str> = pl.split_whitespace().collect();
                        let [a, b] = floats::<2>(pn, &fields)?;
                        rec.points.push((a, b));
                    }
                } else {
                    rec.fields.insert(tag, unquote(&value));
                }
            }
        }
        if current.is_some() || out.len() != count {
            return Err(Error::RecordCount {
                section: section.to_string(),
                expected: count,
                found: out.len(),
            });
        }
        Ok(out)
    }
}

fn add_records(
    properties: &mut Properties,
    section: &str,
    recs: &[PropertyRecord],
    line: usize,
) -> Result<()> {
    macro_rules! fill {
        ($list:expr, $conv:path) => {
            for r in recs {
                $list.push($conv(r)?);
            }
        };
    }
    match (properties, section) {
        (Properties::Magnetic(t), "pointprops") => fill!(t.points, records::magnetic_point),
        (Properties::Magnetic(t), "bdryprops") => fill!(t.boundaries, records::magnetic_boundary),
        (Properties::Magnetic(t), "blockprops") => fill!(t.materials, records::magnetic_material),
        (Properties::Magnetic(t), "circuitprops") => fill!(t.circuits, records::magnetic_circuit),
        (Properties::Electrostatic(t), "pointprops") => fill!(t.points, records::electrostatic_point),
        (Properties::Electrostatic(t), "bdryprops") => {
            fill!(t.boundaries, records::electrostatic_boundary)
        }
        (Properties::Electrostatic(t), "blockprops") => {
            fill!(t.materials, records::electrostatic_material)
        }
        (Properties::Electrostatic(t), "conductorprops") => {
            fill!(t.circuits, records::electrostatic_conductor)
        }
        (Properties::Heat(t), "pointprops") => fill!(t.points, records::heat_point),
        (Properties::Heat(t), "bdryprops") => fill!(t.boundaries, records::heat_boundary),
        (Properties::Heat(t), "blockprops") => fill!(t.materials, records::heat_material),
        (Properties::Heat(t), "conductorprops") => fill!(t.circuits, records::heat_conductor),
        (Properties::Current(t), "pointprops") => fill!(t.points, records::current_point),
        (Properties::Current(t), "bdryprops") => fill!(t.boundaries, records::current_boundary),
        (Properties::Current(t), "blockprops") => fill!(t.materials, records::current_material),
        (Properties::Current(t), "conductorprops") => fill!(t.circuits, records::current_conductor),
        (p, s) => {
            return Err(Error::parse(
                line,
                format!("[{}] is not valid in a {:?} problem", s, p.domain()),
            ))
        }
    }
    Ok(())
}

/// `[Key] = value` with the key lower-cased.
fn split_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let key = rest[..close].trim().to_ascii_lowercase();
    let after = rest[close + 1..].trim();
    let value = after.strip_prefix('=').unwrap_or(after).trim();
    Some((key, value.to_string()))
}

/// `<Key> = value` (or a bare `<Tag>`) with the key lower-cased.
fn split_tag(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('<')?;
    let close = rest.find('>')?;
    let key = rest[..close].trim().to_ascii_lowercase();
    let after = rest[close + 1..].trim();
    let value = after.strip_prefix('=').unwrap_or(after).trim();
    Some((key, value.to_string()))
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
        .to_string()
}

fn number(line: usize, value: &str) -> Result<f64> {
    unquote(value)
        .parse::<f64>()
        .map_err(|_| Error::parse(line, format!("`{}` is not a number", value)))
}

fn count(line: usize, value: &str) -> Result<usize> {
    let v = number(line, value)?;
    if v < 0.0 || v.fract() != 0.0 {
        return Err(Error::parse(line, format!("`{}` is not a record count", value)));
    }
    Ok(v as usize)
}

fn float_at(line: usize, fields: &[&str], i: usize) -> Result<f64> {
    let f = fields
        .get(i)
        .ok_or_else(|| Error::parse(line, format!("expected at least {} values", i + 1)))?;
    f.parse::<f64>()
        .map_err(|_| Error::parse(line, format!("`{}` is not a number", f)))
}

fn floats<const N: usize>(line: usize, fields: &[&str]) -> Result<[f64; N]> {
    let mut out = [0.0; N];
    for (i, v) in out.iter_mut().enumerate() {
        *v = float_at(line, fields, i)?;
    }
    Ok(out)
}

/// Integer field, or `default` when the record is shorter.
fn int_at(line: usize, fields: &[&str], i: usize, default: i64) -> Result<i64> {
    if i >= fields.len() {
        return Ok(default);
    }
    Ok(float_at(line, fields, i)?.round() as i64)
}

fn node_ref(line: usize, fields: &[&str], i: usize) -> Result<usize> {
    let v = int_at(line, fields, i, -1)?;
    if v < 0 {
        return Err(Error::parse(line, format!("invalid node reference {}", v)));
    }
    Ok(v as usize)
}

/// 1-based property reference; 0 and negative values mean none.
fn one_based(line: usize, fields: &[&str], i: usize) -> Result<Option<usize>> {
    let v = int_at(line, fields, i, 0)?;
    Ok(if v > 0 { Some(v as usize - 1) } else { None })
}

fn positive(v: f64) -> Option<f64> {
    if v > 0.0 {
        Some(v)
    } else {
        None
    }
}

fn has_conductors(domain: Domain) -> bool {
    domain != Domain::Magnetic
}

// x y point_property group [conductor]
fn node(domain: Domain, line: usize, f: &[&str]) -> Result<Node> {
    let [x, y] = floats::<2>(line, f)?;
    let mut n = Node::new(x, y);
    n.point_property = one_based(line, f, 2)?;
    n.group = int_at(line, f, 3, 0)? as i32;
    if has_conductors(domain) {
        n.conductor = one_based(line, f, 4)?;
    }
    Ok(n)
}

// n0 n1 max_side boundary hidden group [conductor]
fn segment(domain: Domain, line: usize, f: &[&str]) -> Result<Segment> {
    let mut s = Segment::new(node_ref(line, f, 0)?, node_ref(line, f, 1)?);
    s.max_side_length = positive(float_at(line, f, 2)?);
    s.boundary = one_based(line, f, 3)?;
    s.hidden = int_at(line, f, 4, 0)? != 0;
    s.group = int_at(line, f, 5, 0)? as i32;
    if has_conductors(domain) {
        s.conductor = one_based(line, f, 6)?;
    }
    Ok(s)
}

// n0 n1 arc_angle max_segment_angle boundary hidden group [conductor]
fn arc(domain: Domain, line: usize, f: &[&str]) -> Result<ArcSegment> {
    let mut a = ArcSegment::new(node_ref(line, f, 0)?, node_ref(line, f, 1)?, float_at(line, f, 2)?);
    if let Some(step) = positive(float_at(line, f, 3)?) {
        a.max_side_angle = step;
    }
    a.boundary = one_based(line, f, 4)?;
    a.hidden = int_at(line, f, 5, 0)? != 0;
    a.group = int_at(line, f, 6, 0)? as i32;
    if has_conductors(domain) {
        a.conductor = one_based(line, f, 7)?;
    }
    Ok(a)
}

/// Block labels.
///
/// Magnetics: `x y block mesh_size circuit magdir group turns flags ["expr"]`.
/// Other domains: `x y block mesh_size group flags`.
/// `block` is 1-based, 0 for unassigned and -1 for no mesh; a positive mesh
/// size d gives a maximum element area of π·d²/4. Flag bit 1 marks the
/// exterior region and bit 2 the default label.
fn label(domain: Domain, line: usize, f: &[&str]) -> Result<BlockLabel> {
    let [x, y] = floats::<2>(line, f)?;
    let block = int_at(line, f, 2, 0)?;
    let region = match block {
        b if b > 0 => Region::Material(b as usize - 1),
        0 => Region::Unassigned,
        _ => Region::NoMesh,
    };
    let mut l = BlockLabel::new(x, y, region);
    l.max_area = positive(float_at(line, f, 3)?).map(|d| std::f64::consts::PI * d * d / 4.0);
    let flags = if domain == Domain::Magnetic {
        l.circuit = one_based(line, f, 4)?;
        let angle = if f.len() > 5 { float_at(line, f, 5)? } else { 0.0 };
        l.group = int_at(line, f, 6, 0)? as i32;
        l.turns = int_at(line, f, 7, 1)? as i32;
        let flags = int_at(line, f, 8, 0)?;
        l.magnetization = match quoted_tail(line_text(f, 9)) {
            Some(expr) if !expr.trim().is_empty() => {
                MagDirection::parse(&expr).map_err(|e| Error::parse(line, e.to_string()))?
            }
            _ => MagDirection::Angle(angle),
        };
        flags
    } else {
        l.group = int_at(line, f, 4, 0)? as i32;
        int_at(line, f, 5, 0)?
    };
    l.is_external = flags & 1 != 0;
    l.is_default = flags & 2 != 0;
    Ok(l)
}

/// Remaining fields from `i`, rejoined: expressions may contain spaces.
fn line_text(fields: &[&str], i: usize) -> String {
    fields.get(i..).map(|f| f.join(" ")).unwrap_or_default()
}

fn quoted_tail(text: String) -> Option<String> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    Some(unquote(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::magnetic::{CircuitKind, MagneticBoundaryKind};
    use crate::problem::heat::HeatBoundaryKind;
    use crate::problem::PointSource;
    use crate::types::Complex;
    use approx::assert_relative_eq;

    const MAGNETIC: &str = r#"
[Format]      =  4.0
[Frequency]   =  60
[Precision]   =  1e-008
[MinAngle]    =  25
[Depth]       =  2
[LengthUnits] =  millimeters
[ProblemType] =  planar
[Coordinates] =  cartesian
[Comment]     =  "coil test"
[PointProps]   = 0
[BdryProps]   = 1
  <BeginBdry>
    <BdryName> = "A=0"
    <BdryType> = 0
    <A_0> = 0
    <A_1> = 0
    <A_2> = 0
    <Phi> = 0
  <EndBdry>
[BlockProps]  = 2
  <BeginBlock>
    <BlockName> = "Air"
    <Mu_x> = 1
    <Mu_y> = 1
  <EndBlock>
  <BeginBlock>
    <BlockName> = "Steel"
    <Sigma> = 5.8
    <BHPoints> = 2
      0.5	100
      1.0	300
  <EndBlock>
[CircuitProps]  = 1
  <BeginCircuit>
    <CircuitName> = "coil"
    <TotalAmps_re> = 10
    <TotalAmps_im> = 0
    <CircuitType> = 1
  <EndCircuit>
[NumPoints] = 3
0	0	0	0
10	0	0	0
0	10	0	0
[NumSegments] = 2
0	1	-1	1	0	0
1	2	0.5	0	1	3
[NumArcSegments] = 1
2	0	90	5	1	0	0
[NumHoles] = 0
[NumBlockLabels] = 2
3	3	2	0.5	1	45	0	20	2
1	1	1	-1	0	0	0	1	0	"theta+90"
[Solution]
garbage that is never read
"#;

    #[test]
    fn test_parse_magnetic_problem() {
        let p = parse_problem(MAGNETIC, Domain::Magnetic).unwrap();
        assert_relative_eq!(p.header.frequency, 60.0);
        assert_relative_eq!(p.header.precision, 1e-8);
        assert_relative_eq!(p.header.min_angle, 25.0);
        assert_eq!(p.header.length_units, LengthUnit::Millimeters);
        assert_eq!(p.header.comment, "coil test");
        let g = &p.geometry;
        assert_eq!(g.nodes.len(), 3);
        // node references are read as written; property references shift by one
        assert_eq!((g.segments[0].n0, g.segments[0].n1), (0, 1));
        assert_eq!((g.segments[1].n0, g.segments[1].n1), (1, 2));
        assert_eq!((g.arcs[0].n0, g.arcs[0].n1), (2, 0));
        assert_eq!(g.segments[0].boundary, Some(0));
        assert_eq!(g.segments[1].boundary, None);
        assert_eq!(g.segments[0].max_side_length, None);
        assert_eq!(g.segments[1].max_side_length, Some(0.5));
        assert!(g.segments[1].hidden);
        assert_eq!(g.segments[1].group, 3);
        assert_relative_eq!(g.arcs[0].arc_angle, 90.0);
        assert_relative_eq!(g.arcs[0].max_side_angle, 5.0);

        let coil = &g.labels[0];
        assert_eq!(coil.region, Region::Material(1));
        assert_eq!(coil.circuit, Some(0));
        assert_eq!(coil.turns, 20);
        assert!(coil.is_default);
        assert!(!coil.is_external);
        assert_eq!(coil.magnetization, MagDirection::Angle(45.0));
        assert_relative_eq!(coil.max_area.unwrap(), std::f64::consts::PI * 0.0625);
        assert!(matches!(g.labels[1].magnetization, MagDirection::Expression(_)));
        assert_eq!(g.labels[1].max_area, None);

        let Properties::Magnetic(t) = &p.properties else {
            panic!("wrong domain");
        };
        assert!(matches!(t.boundaries.get(0).unwrap().kind, MagneticBoundaryKind::Prescribed { .. }));
        let steel = t.materials.by_name("Steel").unwrap();
        assert_relative_eq!(steel.sigma, 5.8e6);
        assert_eq!(steel.bh_curve.len(), 3);
        let coil = t.circuits.get(0).unwrap();
        assert_eq!(coil.kind, CircuitKind::Series);
        assert_eq!(coil.current, Complex::new(10.0, 0.0));
    }

    #[test]
    fn test_heat_rejects_frequency() {
        let err = parse_problem("[Format] = 4\n[Frequency] = 50\n", Domain::Heat).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_record_count_mismatch() {
        let text = "[NumPoints] = 3\n0 0 0 0\n1 0 0 0\n[NumSegments] = 0\n";
        let err = parse_problem(text, Domain::Electrostatic).unwrap_err();
        assert!(matches!(
            err,
            Error::RecordCount { expected: 3, found: 2, .. }
        ));
    }

    #[test]
    fn test_heat_file_with_conductors() {
        let text = r#"
[Format] = 1
[Dt] = 0.5
[ProblemType] = axisymmetric
[ExtZo] = 0
[ExtRo] = 5
[ExtRi] = 4
[unheardof] = 3
[BdryProps] = 1
<BeginBdry>
<BdryName> = "conv"
<BdryType> = 2
<h> = 10
<Tinf> = 293
<EndBdry>
[BlockProps] = 1
<BeginBlock>
<BlockName> = "Al"
<Kx> = 200
<Ky> = 200
<Kt> = 2.4
<TKPoints> = 0
<EndBlock>
[ConductorProps] = 1
<BeginConductor>
<ConductorName> = "hot"
<Tc> = 400
<ConductorType> = 1
<EndConductor>
[PointProps] = 1
<BeginPoint>
<PointName> = "src"
<qp> = 5
<EndPoint>
[NumPoints] = 2
0 0 1 0 1
1 0 0 0 0
[NumSegments] = 1
0 1 -1 1 0 0 1
[NumArcSegments] = 0
[NumHoles] = 1
5 5 0
[NumBlockLabels] = 1
0.5 0.5 1 -1 0 1
"#;
        let p = parse_problem(text, Domain::Heat).unwrap();
        assert_relative_eq!(p.header.dt, 0.5);
        assert_eq!(p.header.problem_type, ProblemType::Axisymmetric);
        assert_relative_eq!(p.header.exterior.ro, 5.0);
        let g = &p.geometry;
        assert_eq!(g.nodes[0].point_property, Some(0));
        assert_eq!(g.nodes[0].conductor, Some(0));
        assert_eq!(g.nodes[1].conductor, None);
        assert_eq!(g.segments[0].conductor, Some(0));
        assert_eq!(g.labels.len(), 2);
        assert_eq!(g.labels[0].region, Region::NoMesh);
        assert!(g.labels[1].is_external);

        let Properties::Heat(t) = &p.properties else {
            panic!("wrong domain");
        };
        assert_eq!(
            t.boundaries.get(0).unwrap().kind,
            HeatBoundaryKind::Convection { h: 10.0, t_inf: 293.0 }
        );
        assert_relative_eq!(t.materials.get(0).unwrap().kt, 2.4e6);
        assert_eq!(t.points.get(0).unwrap().value, PointSource::Source(5.0));
    }

    #[test]
    fn test_circuits_rejected_outside_magnetics() {
        let text = "[CircuitProps] = 1\n<BeginCircuit>\n<CircuitName> = \"c\"\n<EndCircuit>\n";
        assert!(parse_problem(text, Domain::Electrostatic).is_err());
    }

    #[test]
    fn test_unterminated_record() {
        let text = "[BlockProps] = 1\n<BeginBlock>\n<BlockName> = \"a\"\n[NumPoints] = 0\n";
        assert!(matches!(
            parse_problem(text, Domain::Electrostatic),
            Err(Error::RecordCount { .. })
        ));
    }
}
