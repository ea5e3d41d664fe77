//! Closed-form tube current equations.
//!
//! Every model family evaluates one of these free functions with
//! coefficients read from its [`ParameterSet`]. All currents are in mA and
//! all voltages in volts. The functions never return NaN: intermediate
//! quantities are clamped before `ln`/`powf`, and the public entry points
//! pass their result through [`clamp_current`].

use super::parameter::{ParameterId, ParameterSet};

/// Floor applied to divisors and logarithm arguments.
pub const EPSILON: f64 = 1e-12;

/// Cohen-Helie exponent clamp.
const COHEN_HELIE_EXP_LIMIT: f64 = 100.0;

/// Koren exponent clamp used by the beam-tetrode formulation.
const KOREN_EXP_LIMIT: f64 = 50.0;

/// Upper limit on the Derk screen-shift product.
const DERK_SHIFT_LIMIT: f64 = 100.0;

/// Map non-finite or negative currents to zero.
pub fn clamp_current(i: f64) -> f64 {
    if i.is_finite() && i > 0.0 {
        i
    } else {
        0.0
    }
}

/// `ln(1 + e^y)` without overflow for large `y`.
fn softplus(y: f64) -> f64 {
    if y > 30.0 {
        y + (-y).exp().ln_1p()
    } else {
        y.exp().ln_1p()
    }
}

/// Triode coefficients shared by every family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriodeTerms {
    pub mu: f64,
    pub kg1: f64,
    pub x: f64,
    pub kp: f64,
    pub kvb: f64,
    pub kvb1: f64,
    pub vct: f64,
}

impl TriodeTerms {
    pub fn from_set(set: &ParameterSet) -> Self {
        Self {
            mu: set.get(ParameterId::Mu),
            kg1: set.get(ParameterId::Kg1),
            x: set.get(ParameterId::X),
            kp: set.get(ParameterId::Kp),
            kvb: set.get(ParameterId::Kvb),
            kvb1: set.get(ParameterId::Kvb1),
            vct: set.get(ParameterId::Vct),
        }
    }
}

/// Pentode screen-partition coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PentodeTerms {
    pub kg2: f64,
    pub a: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl PentodeTerms {
    pub fn from_set(set: &ParameterSet) -> Self {
        Self {
            kg2: set.get(ParameterId::Kg2),
            a: set.get(ParameterId::A),
            alpha: set.get(ParameterId::Alpha),
            beta: set.get(ParameterId::Beta),
            gamma: set.get(ParameterId::Gamma),
        }
    }
}

/// Secondary-emission geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondaryEmission {
    pub omega: f64,
    pub lambda: f64,
    pub nu: f64,
    pub s: f64,
    pub ap: f64,
}

impl SecondaryEmission {
    pub fn from_set(set: &ParameterSet) -> Self {
        Self {
            omega: set.get(ParameterId::Omega),
            lambda: set.get(ParameterId::Lambda),
            nu: set.get(ParameterId::Nu),
            s: set.get(ParameterId::S),
            ap: set.get(ParameterId::Ap),
        }
    }

    /// `Psec(Va) = S·Va·(1 + tanh(−ap·(Va − Vco)))`.
    pub fn psec(&self, va: f64, vg1: f64, vg2: f64) -> f64 {
        let vco = vg2 / (self.lambda + 1e-9) - self.nu * vg1 - self.omega;
        let psec = self.s * va * (1.0 + (-self.ap * (va - vco)).tanh());
        if psec.is_finite() {
            psec
        } else {
            0.0
        }
    }
}

/// Simple power-law triode: `Ia = (Va/mu + Vg1 + Vct)^x / Kg1`.
pub fn simple_current(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    let e = va / t.mu.max(EPSILON) + vg1 + t.vct;
    if e <= 0.0 {
        return 0.0;
    }
    clamp_current(e.powf(t.x) / t.kg1.max(EPSILON))
}

/// Koren `E1^x` before division by Kg1.
pub fn koren_epk(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    let kp = t.kp.max(EPSILON);
    let root = (t.kvb + va * va).max(EPSILON).sqrt();
    let e1 = (va / kp) * softplus(kp * (1.0 / t.mu.max(EPSILON) + vg1 / root));
    if !(e1 > 0.0) {
        return 0.0;
    }
    clamp_current(e1.powf(t.x))
}

/// Koren triode anode current.
pub fn koren_current(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    clamp_current(koren_epk(t, va, vg1) / t.kg1.max(EPSILON))
}

/// Cohen-Helie `Ep^x` with the tilted denominator and grid offset.
pub fn cohen_helie_epk(t: &TriodeTerms, v: f64, vg: f64) -> f64 {
    let f = (t.kvb.max(EPSILON) + v * t.kvb1 + v * v).max(0.0).sqrt();
    if f == 0.0 {
        return 0.0;
    }

    let kp = t.kp.max(EPSILON);
    let y = (kp * (1.0 / t.mu.max(EPSILON) + (vg + t.vct) / f))
        .clamp(-COHEN_HELIE_EXP_LIMIT, COHEN_HELIE_EXP_LIMIT);
    let ep = (v / kp) * softplus(y);
    if !(ep > 0.0) {
        return 0.0;
    }
    clamp_current(ep.powf(t.x))
}

/// Cohen-Helie triode anode current.
pub fn cohen_helie_current(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    clamp_current(cohen_helie_epk(t, va, vg1) / t.kg1.max(EPSILON))
}

/// Gardiner `Ep^x`: the Koren exponential replaced by its linear limit.
pub fn gardiner_epk(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    let f = (t.kvb + t.kvb1 * va + va * va).max(EPSILON).sqrt();
    let ep = va * (1.0 / t.mu.max(EPSILON) + (vg1 + t.vct) / f);
    if !(ep > 0.0) {
        return 0.0;
    }
    clamp_current(ep.powf(t.x))
}

/// Gardiner triode anode current.
pub fn gardiner_current(t: &TriodeTerms, va: f64, vg1: f64) -> f64 {
    clamp_current(gardiner_epk(t, va, vg1) / t.kg1.max(EPSILON))
}

/// Koren plate term for the beam-tetrode model: no Kvb1 or Vct.
pub fn koren_ip(t: &TriodeTerms, vg2: f64, vg1: f64) -> f64 {
    if !(vg2.is_finite() && vg1.is_finite()) {
        return 0.0;
    }
    let kp = t.kp.max(EPSILON);
    let f = (t.kvb + vg2 * vg2).max(EPSILON).sqrt();
    let y = (kp * (1.0 / t.mu.max(EPSILON) + vg1 / f)).clamp(-KOREN_EXP_LIMIT, KOREN_EXP_LIMIT);
    let base = (vg2 / kp) * softplus(y);
    if !(base > EPSILON) {
        return 0.0;
    }
    clamp_current(base.powf(t.x))
}

/// Derk knee factor `1/(1 + (shift·Va)^Gamma)`.
///
/// With Gamma = 1 and Alpha = 0 this is the legacy `1/(1 + Beta·Va)`.
pub fn derk_knee(p: &PentodeTerms, va: f64, vg1: f64) -> f64 {
    let shift = p.beta * (1.0 - p.alpha * vg1);
    let shift_va = (shift * va).clamp(0.0, DERK_SHIFT_LIMIT);
    1.0 / (1.0 + shift_va.powf(p.gamma.max(0.5)))
}

/// Derk-E knee factor `exp(−(Beta·Va)^1.5)`.
pub fn derk_e_knee(beta: f64, va: f64) -> f64 {
    (-(beta * va).max(0.0).powf(1.5)).exp()
}

/// Gardiner knee factor `exp(−(shift·Va)^Gamma)`.
pub fn gardiner_knee(p: &PentodeTerms, va: f64, vg1: f64) -> f64 {
    let shift = p.beta * (1.0 - p.alpha * vg1);
    let shift_va = (shift * va).clamp(0.0, DERK_SHIFT_LIMIT);
    (-shift_va.powf(p.gamma.max(0.5))).exp()
}

/// Pentode anode current from a cathode term and a knee factor:
/// `Ia = Epk·(k·(1−g) + A·Va/Kg1)`, `k = 1/Kg1 − 1/Kg2`.
pub fn pentode_anode_current(kg1: f64, kg2: f64, a: f64, epk: f64, g: f64, va: f64) -> f64 {
    let kg1 = kg1.max(1e-6);
    let kg2 = kg2.max(1e-6);
    let k = 1.0 / kg1 - 1.0 / kg2;
    clamp_current(epk * (k * (1.0 - g) + a * va / kg1))
}

/// Screen current as cathode current less anode current.
pub fn pentode_screen_current(kg1: f64, a: f64, epk: f64, va: f64, ia: f64) -> f64 {
    let ik = epk * (1.0 + a * va) / kg1.max(1e-6);
    clamp_current(ik - ia)
}

/// Beam-tetrode (Derk-E exact) anode and screen currents.
///
/// `se` adds the secondary-emission transfer from anode to screen.
pub fn extract_currents(
    t: &TriodeTerms,
    p: &PentodeTerms,
    se: Option<&SecondaryEmission>,
    va: f64,
    vg1: f64,
    vg2: f64,
) -> (f64, f64) {
    if !(t.kg1 > 0.0 && p.kg2 > 0.0) {
        return (0.0, 0.0);
    }

    let ip = koren_ip(t, vg2, vg1);
    if ip == 0.0 {
        return (0.0, 0.0);
    }

    let inv_kg1 = 1.0 / t.kg1;
    let inv_kg2 = 1.0 / p.kg2;
    let alpha_s = p.alpha;
    let alpha = 1.0 - (t.kg1 / p.kg2) * (1.0 + alpha_s);
    let g = derk_e_knee(p.beta, va);
    let psec = se.map_or(0.0, |se| se.psec(va, vg1, vg2));

    let ia = ip * (inv_kg1 - inv_kg2 + p.a * va * inv_kg1 - g * (alpha * inv_kg1 + alpha_s * inv_kg2))
        - ip * psec * inv_kg2;
    let ig2 = ip * inv_kg2 * (1.0 + alpha_s * g + psec);

    (clamp_current(ia), clamp_current(ig2))
}
