//! Figure styling shared by every panel of the paper.
//!
//! The plotting itself happens elsewhere; this module only fixes sizes,
//! colours and the global plotting parameters so every figure script agrees.

use serde::Serialize;
use std::collections::BTreeMap;

/// Width and height in inches.
pub type FigSize = (f64, f64);

pub const LARGE_FIG: FigSize = (7.0, 8.0);
pub const MED_FIG: FigSize = (4.3, 4.3);

// ── Panels ────────────────────────────────────────────────────────────────────

/// Sizes of the individual panels in the paper.
pub struct Panels;

impl Panels {
    pub const TINY_H: f64 = 0.5;
    pub const SMALL_H: f64 = 1.2;
    pub const MED_H: f64 = Self::SMALL_H + Self::TINY_H;
    pub const BIG_H: f64 = 3.0;

    pub const SCHEMATIC: FigSize = (2.0, Self::MED_H);
    pub const RASTER: FigSize = (2.4, Self::SMALL_H);
    /// Fills the width left next to the schematic.
    pub const VELOCITY: FigSize = (LARGE_FIG.0 - Self::SCHEMATIC.0, Self::TINY_H);
    pub const PROJ_3D_ALIGN: FigSize = (LARGE_FIG.0, Self::SMALL_H);
    pub const CCA: FigSize = (1.5, Self::SMALL_H);
    pub const CCA_HIST: FigSize = (2.0, Self::SMALL_H);

    pub const RNN_RASTER: FigSize = (2.0, Self::SMALL_H);
    pub const RNN_VELOCITY: FigSize = (2.0, Self::TINY_H);
    pub const RNN_CCA: FigSize = (1.5, Self::MED_H - 0.2);
    pub const RNN_CCA_HIST: FigSize = (2.0, Self::MED_H - 0.2);

    /// Row heights keyed by name.
    pub fn heights() -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("tiny_h", Self::TINY_H),
            ("small_h", Self::SMALL_H),
            ("med_h", Self::MED_H),
            ("big_h", Self::BIG_H),
        ])
    }

    /// Panel sizes keyed by name.
    pub fn sizes() -> BTreeMap<&'static str, FigSize> {
        BTreeMap::from([
            ("schematic", Self::SCHEMATIC),
            ("raster", Self::RASTER),
            ("velocity", Self::VELOCITY),
            ("proj_3d_align", Self::PROJ_3D_ALIGN),
            ("cca", Self::CCA),
            ("cca_hist", Self::CCA_HIST),
            ("rnn_raster", Self::RNN_RASTER),
            ("rnn_velocity", Self::RNN_VELOCITY),
            ("rnn_cca", Self::RNN_CCA),
            ("rnn_cca_hist", Self::RNN_CCA_HIST),
        ])
    }
}

// ── Colours ───────────────────────────────────────────────────────────────────

/// A colour as understood by the plotting backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Color {
    Named(&'static str),
    Rgba(f64, f64, f64, f64),
}

/// Colours for the different data types in the paper.
pub struct Colors;

impl Colors {
    pub const MOUSE_M1: Color = Color::Named("tab:blue");
    pub const MOUSE_STR: Color = Color::Named("tab:orange");
    pub const MAIN_CC: Color = Color::Named("r");
    pub const LOWER_CC: Color = Color::Named("k");
    pub const UPPER_CC: Color = Color::Named("cornflowerblue");
    pub const SIM1_CC: Color = Color::Named("cornflowerblue");
    pub const SIM2_CC: Color = Color::Named("palevioletred");
    pub const SIM_ACROSS_CC: Color = Color::Named("indigo");
    pub const MONKEY_PTS: Color = Color::Named("xkcd:brown");
    pub const MOUSE_PTS: Color = Color::Named("xkcd:violet");
    pub const LEFT_TRIAL: Color = Color::Rgba(0.0, 1.0, 0.0, 1.0);
    pub const RIGHT_TRIAL: Color = Color::Rgba(1.0, 0.0, 0.0, 1.0);

    pub fn all() -> BTreeMap<&'static str, Color> {
        BTreeMap::from([
            ("mouse_m1", Self::MOUSE_M1),
            ("mouse_str", Self::MOUSE_STR),
            ("main_cc", Self::MAIN_CC),
            ("lower_cc", Self::LOWER_CC),
            ("upper_cc", Self::UPPER_CC),
            ("sim1_cc", Self::SIM1_CC),
            ("sim2_cc", Self::SIM2_CC),
            ("sim_across_cc", Self::SIM_ACROSS_CC),
            ("monkey_pts", Self::MONKEY_PTS),
            ("mouse_pts", Self::MOUSE_PTS),
            ("left_trial", Self::LEFT_TRIAL),
            ("right_trial", Self::RIGHT_TRIAL),
        ])
    }
}

// ── Global plotting parameters ────────────────────────────────────────────────

/// Value of one plotting parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RcValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for RcValue {
    fn from(v: bool) -> Self {
        RcValue::Bool(v)
    }
}

impl From<f64> for RcValue {
    fn from(v: f64) -> Self {
        RcValue::Number(v)
    }
}

impl From<&str> for RcValue {
    fn from(v: &str) -> Self {
        RcValue::Text(v.to_string())
    }
}

/// The paper's global plotting parameters with `overrides` applied on top.
pub fn rc_params<K, V>(overrides: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, RcValue>
where
    K: Into<String>,
    V: Into<RcValue>,
{
    let defaults: [(&str, RcValue); 19] = [
        ("backend", "PDF".into()),
        ("lines.markersize", RcValue::Number(4.0)),
        ("xtick.major.pad", RcValue::Number(1.0)),
        ("ytick.major.pad", RcValue::Number(1.0)),
        ("axes.labelpad", RcValue::Number(2.0)),
        ("axes.titlepad", RcValue::Number(5.0)),
        ("font.size", RcValue::Number(8.0)),
        ("axes.titlesize", RcValue::Number(8.0)),
        ("axes.labelsize", RcValue::Number(8.0)),
        ("xtick.labelsize", RcValue::Number(6.5)),
        ("ytick.labelsize", RcValue::Number(6.5)),
        ("legend.fontsize", RcValue::Number(6.5)),
        ("legend.title_fontsize", RcValue::Number(6.5)),
        ("text.usetex", true.into()),
        ("font.family", "sans-serif".into()),
        ("font.serif", "Helvetica".into()),
        ("legend.frameon", false.into()),
        ("legend.fancybox", false.into()),
        ("figure.dpi", RcValue::Number(600.0)),
    ];

    let mut params: BTreeMap<String, RcValue> = defaults
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    for (k, v) in overrides {
        params.insert(k.into(), v.into());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_panel_sizes() {
        assert!((Panels::MED_H - 1.7).abs() < 1e-12);
        assert!((Panels::VELOCITY.0 - 5.0).abs() < 1e-12);
        assert!((Panels::RNN_CCA.1 - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_panel_and_colour_tables() {
        assert_eq!(Panels::heights()["med_h"], Panels::MED_H);
        assert_eq!(Panels::sizes().len(), 10);
        assert_eq!(Panels::sizes()["velocity"], Panels::VELOCITY);
        assert_eq!(Colors::all().len(), 12);

        let json = serde_json::to_value(Colors::all()).unwrap();
        assert_eq!(json["monkey_pts"], "xkcd:brown");
        assert_eq!(json["right_trial"], serde_json::json!([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_rc_params_defaults() {
        let params = rc_params(Vec::<(String, RcValue)>::new());
        assert_eq!(params["figure.dpi"], RcValue::Number(600.0));
        assert_eq!(params["text.usetex"], RcValue::Bool(true));
        assert_eq!(params["font.family"], RcValue::Text("sans-serif".into()));
    }

    #[test]
    fn test_rc_params_overrides_win() {
        let params = rc_params([("font.size", 10.0), ("figure.dpi", 300.0)]);
        assert_eq!(params["font.size"], RcValue::Number(10.0));
        assert_eq!(params["figure.dpi"], RcValue::Number(300.0));
        assert_eq!(params["axes.labelsize"], RcValue::Number(8.0));
    }

    #[test]
    fn test_colors_serialize() {
        let json = serde_json::to_string(&[Colors::MAIN_CC, Colors::LEFT_TRIAL]).unwrap();
        assert_eq!(json, r#"["r",[0.0,1.0,0.0,1.0]]"#);
    }
}
