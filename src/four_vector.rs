use serde::{Deserialize, Serialize};

/// A basic four-vector
///
/// The zero component is the energy component. The remainder are
/// the spatial components
#[derive(Deserialize, Serialize, PartialEq, PartialOrd, Debug, Clone, Copy, Default)]
pub struct FourVector {
    p: [f64; 4],
}

impl FourVector {
    /// Construct a new four-vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from transverse momentum, pseudorapidity, azimuthal
    /// angle, and mass
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p_sq = px * px + py * py + pz * pz;
        let e = if m >= 0. {
            (p_sq + m * m).sqrt()
        } else {
            (p_sq - m * m).max(0.).sqrt()
        };
        [e, px, py, pz].into()
    }

    /// The spatial norm \sqrt{\sum v_i^2} with i = 1,2,3
    pub fn spatial_norm(&self) -> f64 {
        self.spatial_norm_sq().sqrt()
    }

    /// The square \sum v_i^2 with i = 1,2,3 of the spatial norm
    pub fn spatial_norm_sq(&self) -> f64 {
        self.p.iter().skip(1).map(|e| e * e).sum()
    }

    /// The scalar transverse momentum
    pub fn pt(&self) -> f64 {
        self.p[1].hypot(self.p[2])
    }

    /// The pseudorapidity
    ///
    /// Vectors along the beam axis have infinite pseudorapidity, with
    /// the sign of the longitudinal momentum. For the null vector it is
    /// zero.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        let pz = self.p[3];
        if pt > 0. {
            (pz / pt).asinh()
        } else if pz == 0. {
            0.
        } else {
            f64::INFINITY.copysign(pz)
        }
    }

    /// The azimuthal angle in (-π, π]
    pub fn phi(&self) -> f64 {
        if self.p[1] == 0. && self.p[2] == 0. {
            0.
        } else {
            self.p[2].atan2(self.p[1])
        }
    }

    /// The invariant mass \sqrt{v_0^2 - \sum v_i^2} with i = 1,2,3
    ///
    /// Space-like vectors get a negative mass.
    pub fn m(&self) -> f64 {
        let m_sq = self.m_sq();
        if m_sq < 0. {
            -(-m_sq).sqrt()
        } else {
            m_sq.sqrt()
        }
    }

    /// The invariant mass square v_0^2 - \sum v_i^2 with i = 1,2,3
    pub fn m_sq(&self) -> f64 {
        self.p[0] * self.p[0] - self.spatial_norm_sq()
    }
}

impl From<[f64; 4]> for FourVector {
    fn from(p: [f64; 4]) -> FourVector {
        FourVector { p }
    }
}

impl std::ops::Index<usize> for FourVector {
    type Output = f64;

    fn index(&self, i: usize) -> &Self::Output {
        &self.p[i]
    }
}

impl std::ops::AddAssign for FourVector {
    fn add_assign(&mut self, rhs: FourVector) {
        for (p, q) in self.p.iter_mut().zip(rhs.p) {
            *p += q;
        }
    }
}

impl std::ops::SubAssign for FourVector {
    fn sub_assign(&mut self, rhs: FourVector) {
        for (p, q) in self.p.iter_mut().zip(rhs.p) {
            *p -= q;
        }
    }
}

impl std::ops::Add for FourVector {
    type Output = Self;

    fn add(mut self, rhs: FourVector) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::Sub for FourVector {
    type Output = Self;

    fn sub(mut self, rhs: FourVector) -> Self::Output {
        self -= rhs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1.), "{a} != {b}");
    }

    #[test]
    fn pt_eta_phi_m() {
        let p = FourVector::from_pt_eta_phi_m(150., -1.2, 2.5, 10.);
        assert_close(p.pt(), 150.);
        assert_close(p.eta(), -1.2);
        assert_close(p.phi(), 2.5);
        assert_close(p.m(), 10.);

        let p = FourVector::from_pt_eta_phi_m(-40., 0., 0., 0.);
        assert_close(p.pt(), 40.);
        assert_close(p[0], 40.);
    }

    #[test]
    fn pair_mass() {
        let j1 = FourVector::from_pt_eta_phi_m(50., 0., 0., 0.);
        let j2 = FourVector::from_pt_eta_phi_m(50., 0., std::f64::consts::PI, 0.);
        let h = j1 + j2;
        assert_close(h.m(), 100.);
        assert!(h.pt() < 1e-9);
        assert_eq!(h - j2, j1);
    }

    #[test]
    fn degenerate() {
        let p = FourVector::new();
        assert_eq!(p.eta(), 0.);
        assert_eq!(p.phi(), 0.);
        assert_eq!(p.m(), 0.);

        let beam = FourVector::from([10., 0., 0., -10.]);
        assert_eq!(beam.eta(), f64::NEG_INFINITY);

        let spacelike = FourVector::from([3., 0., 0., 5.]);
        assert_close(spacelike.m(), -4.);
    }
}
