//! Plain-text rendering of fit and circuit results for the CLI frontend.

use std::fmt::Write;

use crate::circuit::{CathodeFollowerResult, HarmonicRow, Harmonics, StageResult};
use crate::device::Device;
use crate::models::DeviceModel;
use crate::solver::FitReport;

/// Fit outcome followed by the fitted coefficients of the device's model.
pub fn fit_summary(device: &Device, report: &FitReport) -> String {
    let model = device.model();
    let mut out = String::new();
    let status = if report.converged {
        "converged"
    } else {
        "not converged"
    };
    let _ = writeln!(out, "{} ({}, {})", device.name, model.kind(), device.device_type());
    let _ = writeln!(
        out,
        "  fit: {} after {} iterations, cost {:.4e} -> {:.4e}",
        status, report.iterations, report.initial_cost, report.final_cost
    );
    for &id in model.parameter_ids() {
        let _ = writeln!(out, "  {:<8} {:>14.6}", id.to_string(), model.value(id));
    }
    out
}

/// Anode and screen currents at one operating point.
pub fn currents(device: &Device, va: f64, vg1: f64, vg2: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Va = {:.1} V, Vg1 = {:.2} V, Vg2 = {:.1} V", va, vg1, vg2);
    let _ = writeln!(out, "  Ia  = {:.4} mA", device.anode_current(va, vg1, vg2));
    let _ = writeln!(out, "  Ig2 = {:.4} mA", device.screen_current(va, vg1, vg2));
    out
}

fn harmonics_line(out: &mut String, h: &Harmonics) {
    let _ = writeln!(
        out,
        "  HD2 {:.3}%  HD3 {:.3}%  HD4 {:.3}%  HD5 {:.3}%  THD {:.3}%",
        h.hd2, h.hd3, h.hd4, h.hd5, h.thd
    );
}

/// Outputs of an output stage.
pub fn stage(name: &str, r: &StageResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", name);
    if !r.operating_point.is_found() && r.ik == 0.0 {
        let _ = writeln!(out, "  not available");
        return out;
    }
    let bias = if r.measured_bias { " (measured)" } else { "" };
    let _ = writeln!(out, "  Vk    = {:.2} V{}", r.vk, bias);
    let _ = writeln!(out, "  Ik    = {:.2} mA", r.ik);
    let _ = writeln!(out, "  Rk    = {:.0} ohms", r.rk);
    let _ = writeln!(out, "  Pout  = {:.2} W", r.pout);
    let _ = writeln!(out, "  Phead = {:.2} W at {:.1} Vpk", r.phead, r.effective_headroom);
    let _ = writeln!(out, "  gm    = {:.3} mA/V, ra = {:.0} ohms", r.gm, r.ra);
    let _ = writeln!(out, "  swing = {:.1} Vpp max, {:.1} Vpp symmetric", r.max_vpp, r.sym_vpp);
    let _ = writeln!(out, "  input = {:.2} Vpp", r.input_sensitivity);
    harmonics_line(&mut out, &r.harmonics);
    out
}

/// Outputs of a cathode follower.
pub fn cathode_follower(name: &str, r: &CathodeFollowerResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", name);
    if !r.operating_point.is_found() {
        let _ = writeln!(out, "  not available");
        return out;
    }
    let _ = writeln!(out, "  Vg   = {:.2} V", r.vg);
    let _ = writeln!(out, "  Vk   = {:.2} V", r.vk);
    let _ = writeln!(out, "  Ik   = {:.2} mA", r.ik);
    let _ = writeln!(out, "  ro   = {:.0} ohms", r.ro);
    let _ = writeln!(out, "  gain = {:.3}", r.gain);
    out
}

/// One row per headroom step.
pub fn headroom_table(rows: &[HarmonicRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Vpk", "HD2%", "HD3%", "HD4%", "HD5%", "THD%"
    );
    for row in rows {
        let h = &row.harmonics;
        let _ = writeln!(
            out,
            "{:>8.1} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
            row.headroom, h.hd2, h.hd3, h.hd4, h.hd5, h.thd
        );
    }
    out
}
