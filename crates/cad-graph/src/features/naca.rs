//! NACA four-digit airfoil section.
//!
//! Upper and lower surfaces are sampled at cosine-clustered chordwise
//! positions, joined into a closed wire and capped with a planar face. The
//! trailing edge closes either at a degenerate point or with a finite
//! straight clip. The thickness may be offset inward to support
//! chord-length-preserving thinning.

use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::primitives::planar_face;
use cad_kernel::{Curve, Edge, Pnt, Shape, Wire};

use crate::feature::{Feature, FeatureCore, ShapeBundle, ShapeFeature};
use crate::feature::FeatureRef;
use crate::params::{Scalar, ScalarRef, Vector, VectorRef};

enum Profile {
    Code(String),
    Values {
        thickness: ScalarRef,
        camber: ScalarRef,
        camber_pos: ScalarRef,
    },
}

pub struct NacaFourDigit {
    core: FeatureCore,
    profile: Profile,
    p0: VectorRef,
    ex: VectorRef,
    ez: VectorRef,
    tofs: ScalarRef,
    clipte: ScalarRef,
}

impl NacaFourDigit {
    pub fn create(
        code: impl Into<String>,
        p0: VectorRef,
        ex: VectorRef,
        ez: VectorRef,
        tofs: ScalarRef,
        clipte: ScalarRef,
    ) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            profile: Profile::Code(code.into()),
            p0,
            ex,
            ez,
            tofs,
            clipte,
        })
    }

    pub fn create_values(
        thickness: ScalarRef,
        camber: ScalarRef,
        camber_pos: ScalarRef,
        p0: VectorRef,
        ex: VectorRef,
        ez: VectorRef,
        tofs: ScalarRef,
        clipte: ScalarRef,
    ) -> FeatureRef {
        Rc::new(Self {
            core: FeatureCore::new(),
            profile: Profile::Values {
                thickness,
                camber,
                camber_pos,
            },
            p0,
            ex,
            ez,
            tofs,
            clipte,
        })
    }

    /// Half thickness, camber line and camber slope at relative chord
    /// position `xc`.
    fn calc_profile(xc: f64, tc: f64, m: f64, p: f64) -> (f64, f64, f64) {
        let t = 5.0
            * tc
            * (0.2969 * xc.sqrt() - 0.1260 * xc - 0.3516 * xc.powi(2) + 0.2843 * xc.powi(3)
                - 0.1015 * xc.powi(4));
        let mut yc = 0.0;
        let mut dycdx = 0.0;
        if m.abs() > 1e-10 {
            if xc < p {
                yc = m * xc / (p * p) * (2.0 * p - xc);
                dycdx = 2.0 * m / (p * p) * (p - xc);
            } else {
                yc = m * (1.0 - xc) / (1.0 - p).powi(2) * (1.0 + xc - 2.0 * p);
                dycdx = 2.0 * m / (1.0 - p).powi(2) * (p - xc);
            }
        }
        (t, yc, dycdx)
    }

    fn resolve_profile(&self) -> Result<(f64, f64, f64), CadError> {
        match &self.profile {
            Profile::Values {
                thickness,
                camber,
                camber_pos,
            } => Ok((thickness.value()?, camber.value()?, camber_pos.value()?)),
            Profile::Code(code) => {
                if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CadError::invalid(
                        "NacaFourDigit",
                        format!("invalid NACA code (was \"{code}\")"),
                    ));
                }
                let m = code[0..1].parse::<f64>().unwrap() / 100.0;
                let p = code[1..2].parse::<f64>().unwrap() / 10.0;
                let tc = code[2..4].parse::<f64>().unwrap() / 100.0;
                Ok((tc, m, p))
            }
        }
    }
}

impl Feature for NacaFourDigit {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "NacaFourDigit"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        match &self.profile {
            Profile::Code(code) => h.add_str(code),
            Profile::Values {
                thickness,
                camber,
                camber_pos,
            } => {
                thickness.hash_into(h);
                camber.hash_into(h);
                camber_pos.hash_into(h);
            }
        }
        self.p0.hash_into(h);
        self.ex.hash_into(h);
        self.ez.hash_into(h);
        self.tofs.hash_into(h);
        self.clipte.hash_into(h);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        let (tc, m, p) = self.resolve_profile()?;
        let tofs = self.tofs.value()?;
        let clipte = self.clipte.value()?;

        let p0 = Pnt::from(self.p0.value()?);
        let mut ex = self.ex.value()?;
        let mut ez = self.ez.value()?;
        let mut chord = ex.norm();
        if chord < 1e-12 || ez.norm() < 1e-12 {
            return Err(CadError::invalid(
                "NacaFourDigit",
                "chord and span vectors must be non-zero",
            ));
        }
        ex /= chord;
        ez /= ez.norm();
        let ey = ez.cross(&ex);

        // Thin the section while preserving the chord length.
        chord -= 2.0 * tofs;
        if chord <= 0.0 {
            return Err(CadError::invalid(
                "NacaFourDigit",
                "thickness offset eats the whole chord",
            ));
        }

        let np = 25usize;
        let sampled = if clipte > 0.0 { np } else { np - 1 };
        let mut pts_up = Vec::with_capacity(np);
        let mut pts_lo = Vec::with_capacity(np);
        let le = p0 + ex * tofs;
        for j in 0..sampled {
            let xc = 0.5 * (1.0 - (std::f64::consts::PI * j as f64 / (np - 1) as f64).cos())
                * (chord - clipte)
                / chord;
            let (t_raw, yc, dycdx) = Self::calc_profile(xc, tc, m, p);
            let t = t_raw * (1.0 - 2.0 * tofs / (t_raw * chord)).max(0.1);
            let theta = dycdx.atan();
            pts_up.push(
                le + ex * ((xc - t * theta.sin()) * chord) + ey * ((yc + t * theta.cos()) * chord),
            );
            pts_lo.push(
                le + ex * ((xc + t * theta.sin()) * chord) + ey * ((yc - t * theta.cos()) * chord),
            );
        }
        if clipte <= 0.0 {
            // Close the trailing edge at a single point.
            let te = le + ex * chord;
            pts_up.push(te);
            pts_lo.push(te);
        }

        // Upper surface runs leading edge to trailing edge, the lower one
        // back again, so the boundary wire chains head to tail.
        let eup = Edge {
            first: pts_up[0],
            last: *pts_up.last().unwrap(),
            curve: Curve::BSpline {
                poles: pts_up.clone(),
            },
        };
        let mut lo_reversed = pts_lo.clone();
        lo_reversed.reverse();
        let elo = Edge {
            first: lo_reversed[0],
            last: *lo_reversed.last().unwrap(),
            curve: Curve::BSpline { poles: lo_reversed },
        };

        let wire = if clipte > 0.0 {
            let xc = (chord - clipte) / chord;
            let (_, yc, _) = Self::calc_profile(xc, tc, m, p);
            let te_mid = le + ex * (xc * chord) + ey * (yc * chord);
            Wire::new(vec![
                eup.clone(),
                Edge::line(*pts_up.last().unwrap(), te_mid),
                Edge::line(te_mid, *pts_lo.last().unwrap()),
                elo,
            ])
        } else {
            Wire::new(vec![eup, elo])
        };

        let face = planar_face(wire.clone())
            .map_err(|e| CadError::geometry("NacaFourDigit", "planar_face", e.to_string()))?;

        let mut bundle = ShapeBundle::new(Shape::Face(face));
        bundle
            .subshapes
            .insert("OuterWire".into(), ShapeFeature::create(Shape::Wire(wire)));
        bundle.ref_values.insert("L".into(), chord);
        bundle.ref_points.insert("p_le".into(), le);
        bundle.ref_points.insert("p_te".into(), le + ex * chord);
        Ok(bundle)
    }
}
