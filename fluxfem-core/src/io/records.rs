//! `<BeginX> ... <EndX>` property records and their per-domain conversion.
//!
//! Values in the file use the customary units of each domain; conversion
//! to SI happens here.

use crate::error::{Error, Result};
use crate::problem::current::{CurrentBoundary, CurrentBoundaryKind, CurrentMaterial, CurrentPoint};
use crate::problem::electrostatic::{
    ElectrostaticBoundary, ElectrostaticBoundaryKind, ElectrostaticMaterial, ElectrostaticPoint,
};
use crate::problem::heat::{HeatBoundary, HeatBoundaryKind, HeatMaterial, HeatPoint};
use crate::problem::magnetic::{
    CircuitKind, Lamination, MagneticBoundary, MagneticBoundaryKind, MagneticCircuit,
    MagneticMaterial, MagneticPoint,
};
use crate::problem::{Conductor, ConductorDrive, Curve, PointSource};
use crate::types::Complex;
use std::collections::HashMap;

/// One parsed property record.
#[derive(Debug, Clone, Default)]
pub struct PropertyRecord {
    /// Line of the `<Begin...>` tag.
    pub line: usize,
    /// Lower-case keys to raw (unquoted) values.
    pub fields: HashMap<String, String>,
    /// B-H or T-K points.
    pub points: Vec<(f64, f64)>,
}

impl PropertyRecord {
    fn error(&self, message: String) -> Error {
        Error::parse(self.line, message)
    }

    /// Numeric field, or `default` when absent.
    pub fn num(&self, key: &str, default: f64) -> Result<f64> {
        match self.fields.get(key) {
            None => Ok(default),
            Some(v) => v
                .trim()
                .parse::<f64>()
                .map_err(|_| self.error(format!("<{}> = {} is not a number", key, v))),
        }
    }

    /// Complex field from `key_re`/`key_im`, falling back to plain `key`.
    pub fn complex(&self, key: &str) -> Result<Complex> {
        let re_key = format!("{}_re", key);
        let im_key = format!("{}_im", key);
        if self.fields.contains_key(&re_key) || self.fields.contains_key(&im_key) {
            Ok(Complex::new(self.num(&re_key, 0.0)?, self.num(&im_key, 0.0)?))
        } else {
            Ok(Complex::new(self.num(key, 0.0)?, 0.0))
        }
    }

    pub fn int(&self, key: &str, default: i64) -> Result<i64> {
        let v = self.num(key, default as f64)?;
        Ok(v.round() as i64)
    }

    pub fn text(&self, key: &str) -> String {
        self.fields.get(key).cloned().unwrap_or_default()
    }

    fn curve(&self) -> Result<Curve> {
        Curve::new(self.points.clone()).map_err(|e| self.error(e.to_string()))
    }
}

fn point_value<T: PartialEq + Default + Copy>(fixed: T, source: T) -> PointSource<T> {
    if source != T::default() {
        PointSource::Source(source)
    } else {
        PointSource::Fixed(fixed)
    }
}

fn drive<T>(rec: &PropertyRecord, potential: T, total: T) -> Result<ConductorDrive<T>> {
    match rec.int("conductortype", 0)? {
        0 => Ok(ConductorDrive::Total(total)),
        1 => Ok(ConductorDrive::Potential(potential)),
        other => Err(rec.error(format!("unknown conductor type {}", other))),
    }
}

pub fn magnetic_point(rec: &PropertyRecord) -> Result<MagneticPoint> {
    Ok(MagneticPoint {
        name: rec.text("pointname"),
        value: point_value(rec.complex("a")?, rec.complex("i")?),
    })
}

pub fn magnetic_boundary(rec: &PropertyRecord) -> Result<MagneticBoundary> {
    let kind = match rec.int("bdrytype", 0)? {
        0 => MagneticBoundaryKind::Prescribed {
            a0: rec.num("a_0", 0.0)?,
            a1: rec.num("a_1", 0.0)?,
            a2: rec.num("a_2", 0.0)?,
            phi: rec.num("phi", 0.0)?,
        },
        1 => MagneticBoundaryKind::SmallSkinDepth {
            mu: rec.num("mu_ssd", 1.0)?,
            sigma: rec.num("sigma_ssd", 0.0)? * 1e6,
        },
        2 => MagneticBoundaryKind::Mixed {
            c0: Complex::new(rec.num("c0", 0.0)?, rec.num("c0i", 0.0)?),
            c1: Complex::new(rec.num("c1", 0.0)?, rec.num("c1i", 0.0)?),
        },
        3 => MagneticBoundaryKind::StrategicDualImage,
        4 => MagneticBoundaryKind::Periodic,
        5 => MagneticBoundaryKind::Antiperiodic,
        6 => MagneticBoundaryKind::PeriodicAirGap,
        7 => MagneticBoundaryKind::AntiperiodicAirGap,
        other => return Err(rec.error(format!("unknown magnetic boundary type {}", other))),
    };
    Ok(MagneticBoundary {
        name: rec.text("bdryname"),
        kind,
    })
}

pub fn magnetic_material(rec: &PropertyRecord) -> Result<MagneticMaterial> {
    let phi_h = rec.num("phi_h", 0.0)?;
    let lamination = match rec.int("lamtype", 0)? {
        0 => Lamination::InPlane,
        1 => Lamination::ParallelX,
        2 => Lamination::ParallelY,
        t if t >= 3 => Lamination::Wire {
            strands: rec.int("nstrands", 1)?.max(1) as u32,
            diameter: rec.num("wired", 0.0)? * 1e-3,
        },
        other => return Err(rec.error(format!("unknown lamination type {}", other))),
    };
    let material = MagneticMaterial {
        name: rec.text("blockname"),
        mu_x: rec.num("mu_x", 1.0)?,
        mu_y: rec.num("mu_y", 1.0)?,
        hc: rec.num("h_c", 0.0)?,
        j: Complex::new(rec.num("j_re", 0.0)?, rec.num("j_im", 0.0)?) * 1e6,
        sigma: rec.num("sigma", 0.0)? * 1e6,
        lam_thickness: rec.num("d_lam", 0.0)? * 1e-3,
        lam_fill: rec.num("lamfill", 1.0)?,
        lamination,
        phi_hx: rec.num("phi_hx", phi_h)?,
        phi_hy: rec.num("phi_hy", phi_h)?,
        bh_curve: rec.curve()?,
    };
    if !(material.lam_fill > 0.0 && material.lam_fill <= 1.0) {
        return Err(rec.error(format!("lamination fill {} outside (0, 1]", material.lam_fill)));
    }
    material.normalized().map_err(|e| rec.error(e.to_string()))
}

pub fn magnetic_circuit(rec: &PropertyRecord) -> Result<MagneticCircuit> {
    let kind = match rec.int("circuittype", 0)? {
        0 => CircuitKind::Parallel,
        1 => CircuitKind::Series,
        other => return Err(rec.error(format!("unknown circuit type {}", other))),
    };
    Ok(MagneticCircuit {
        name: rec.text("circuitname"),
        current: rec.complex("totalamps")?,
        kind,
    })
}

pub fn electrostatic_point(rec: &PropertyRecord) -> Result<ElectrostaticPoint> {
    Ok(ElectrostaticPoint {
        name: rec.text("pointname"),
        value: point_value(rec.num("vp", 0.0)?, rec.num("qp", 0.0)?),
    })
}

pub fn electrostatic_boundary(rec: &PropertyRecord) -> Result<ElectrostaticBoundary> {
    let kind = match rec.int("bdrytype", 0)? {
        0 => ElectrostaticBoundaryKind::Fixed(rec.num("vs", 0.0)?),
        1 => ElectrostaticBoundaryKind::Mixed {
            c0: rec.num("c0", 0.0)?,
            c1: rec.num("c1", 0.0)?,
        },
        2 => ElectrostaticBoundaryKind::SurfaceCharge(rec.num("qs", 0.0)?),
        3 => ElectrostaticBoundaryKind::Periodic,
        4 => ElectrostaticBoundaryKind::Antiperiodic,
        other => return Err(rec.error(format!("unknown electrostatic boundary type {}", other))),
    };
    Ok(ElectrostaticBoundary {
        name: rec.text("bdryname"),
        kind,
    })
}

pub fn electrostatic_material(rec: &PropertyRecord) -> Result<ElectrostaticMaterial> {
    Ok(ElectrostaticMaterial {
        name: rec.text("blockname"),
        ex: rec.num("ex", 1.0)?,
        ey: rec.num("ey", 1.0)?,
        qv: rec.num("qv", 0.0)?,
    })
}

pub fn electrostatic_conductor(rec: &PropertyRecord) -> Result<Conductor<f64>> {
    Ok(Conductor {
        name: rec.text("conductorname"),
        drive: drive(rec, rec.num("vc", 0.0)?, rec.num("qc", 0.0)?)?,
    })
}

pub fn heat_point(rec: &PropertyRecord) -> Result<HeatPoint> {
    Ok(HeatPoint {
        name: rec.text("pointname"),
        value: point_value(rec.num("tp", 0.0)?, rec.num("qp", 0.0)?),
    })
}

pub fn heat_boundary(rec: &PropertyRecord) -> Result<HeatBoundary> {
    let t_inf = rec.num("tinf", 0.0)?;
    let kind = match rec.int("bdrytype", 0)? {
        0 => HeatBoundaryKind::FixedTemperature(rec.num("tset", 0.0)?),
        1 => HeatBoundaryKind::HeatFlux(rec.num("qs", 0.0)?),
        2 => HeatBoundaryKind::Convection {
            h: rec.num("h", 0.0)?,
            t_inf,
        },
        3 => HeatBoundaryKind::Radiation {
            beta: rec.num("beta", 0.0)?,
            t_inf,
        },
        4 => HeatBoundaryKind::Periodic,
        5 => HeatBoundaryKind::Antiperiodic,
        other => return Err(rec.error(format!("unknown heat boundary type {}", other))),
    };
    Ok(HeatBoundary {
        name: rec.text("bdryname"),
        kind,
    })
}

pub fn heat_material(rec: &PropertyRecord) -> Result<HeatMaterial> {
    Ok(HeatMaterial {
        name: rec.text("blockname"),
        kx: rec.num("kx", 1.0)?,
        ky: rec.num("ky", 1.0)?,
        qv: rec.num("qv", 0.0)?,
        kt: rec.num("kt", 0.0)? * 1e6,
        kt_curve: rec.curve()?,
    })
}

pub fn heat_conductor(rec: &PropertyRecord) -> Result<Conductor<f64>> {
    Ok(Conductor {
        name: rec.text("conductorname"),
        drive: drive(rec, rec.num("tc", 0.0)?, rec.num("qc", 0.0)?)?,
    })
}

pub fn current_point(rec: &PropertyRecord) -> Result<CurrentPoint> {
    Ok(CurrentPoint {
        name: rec.text("pointname"),
        value: point_value(rec.complex("vp")?, rec.complex("jp")?),
    })
}

pub fn current_boundary(rec: &PropertyRecord) -> Result<CurrentBoundary> {
    let kind = match rec.int("bdrytype", 0)? {
        0 => CurrentBoundaryKind::Fixed(rec.complex("vs")?),
        1 => CurrentBoundaryKind::Mixed {
            c0: rec.complex("c0")?,
            c1: rec.complex("c1")?,
        },
        2 => CurrentBoundaryKind::SurfaceCurrent(rec.complex("js")?),
        3 => CurrentBoundaryKind::Periodic,
        4 => CurrentBoundaryKind::Antiperiodic,
        other => return Err(rec.error(format!("unknown current flow boundary type {}", other))),
    };
    Ok(CurrentBoundary {
        name: rec.text("bdryname"),
        kind,
    })
}

pub fn current_material(rec: &PropertyRecord) -> Result<CurrentMaterial> {
    Ok(CurrentMaterial {
        name: rec.text("blockname"),
        ox: rec.num("ox", 0.0)?,
        oy: rec.num("oy", 0.0)?,
        ex: rec.num("ex", 1.0)?,
        ey: rec.num("ey", 1.0)?,
        ltx: rec.num("ltx", 0.0)?,
        lty: rec.num("lty", 0.0)?,
    })
}

pub fn current_conductor(rec: &PropertyRecord) -> Result<Conductor<Complex>> {
    Ok(Conductor {
        name: rec.text("conductorname"),
        drive: drive(rec, rec.complex("vc")?, rec.complex("qc")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(pairs: &[(&str, &str)]) -> PropertyRecord {
        PropertyRecord {
            line: 1,
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            points: Vec::new(),
        }
    }

    #[test]
    fn test_magnetic_material_units() {
        let rec = record(&[
            ("blockname", "Copper"),
            ("sigma", "58"),
            ("j_re", "2.5"),
            ("d_lam", "0.35"),
        ]);
        let m = magnetic_material(&rec).unwrap();
        assert_eq!(m.name, "Copper");
        assert_relative_eq!(m.sigma, 58e6);
        assert_relative_eq!(m.j.re, 2.5e6);
        assert_relative_eq!(m.lam_thickness, 0.35e-3, epsilon = 1e-15);
        assert_relative_eq!(m.mu_x, 1.0);
    }

    #[test]
    fn test_bh_points_get_origin() {
        let mut rec = record(&[("blockname", "Steel")]);
        rec.points = vec![(0.5, 100.0), (1.0, 300.0)];
        let m = magnetic_material(&rec).unwrap();
        assert_eq!(m.bh_curve.points()[0], (0.0, 0.0));
    }

    #[test]
    fn test_point_property_kind() {
        let fixed = electrostatic_point(&record(&[("vp", "5")])).unwrap();
        assert_eq!(fixed.value, PointSource::Fixed(5.0));
        let charge = electrostatic_point(&record(&[("vp", "5"), ("qp", "1e-9")])).unwrap();
        assert_eq!(charge.value, PointSource::Source(1e-9));
    }

    #[test]
    fn test_conductor_types() {
        let c = heat_conductor(&record(&[("tc", "350"), ("conductortype", "1")])).unwrap();
        assert_eq!(c.drive, ConductorDrive::Potential(350.0));
        let c = current_conductor(&record(&[("qc_re", "2"), ("qc_im", "-1")])).unwrap();
        assert_eq!(c.drive, ConductorDrive::Total(Complex::new(2.0, -1.0)));
        assert!(heat_conductor(&record(&[("conductortype", "4")])).is_err());
    }

    #[test]
    fn test_bad_number_reports_line() {
        let mut rec = record(&[("bdrytype", "abc")]);
        rec.line = 17;
        let err = heat_boundary(&rec).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 17, .. }));
    }
}
