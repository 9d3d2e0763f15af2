//! Color schemes and multi-stop interpolation.

use std::fmt;
use std::str::FromStr;

/// RGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A position in [0, 1] mapped to a color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// Green -> Yellow -> Red, for susceptibility probabilities
    Susceptibility,
    /// Five discrete colors for susceptibility levels (very low ... very high)
    Levels,
    /// Green for stable, red for landslide; for predicted class rasters
    Classes,
    /// Black -> White
    Grayscale,
}

impl ColorScheme {
    pub const ALL: &'static [ColorScheme] = &[
        Self::Susceptibility,
        Self::Levels,
        Self::Classes,
        Self::Grayscale,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Susceptibility => "susceptibility",
            Self::Levels => "levels",
            Self::Classes => "classes",
            Self::Grayscale => "grayscale",
        }
    }

    /// Whether the scheme maps values to a few discrete colors
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Levels | Self::Classes)
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|s| s.name()).collect();
                format!("unknown color scheme '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

// RdYlGn reversed, as used for susceptibility maps
const SUSCEPTIBILITY_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 26, 152, 80),
    ColorStop::new(0.25, 145, 207, 96),
    ColorStop::new(0.50, 255, 255, 191),
    ColorStop::new(0.75, 252, 141, 89),
    ColorStop::new(1.00, 215, 48, 39),
];

const LEVEL_PALETTE: &[Rgb] = &[
    Rgb::new(26, 150, 65),   // very low
    Rgb::new(166, 217, 106), // low
    Rgb::new(255, 255, 191), // moderate
    Rgb::new(253, 174, 97),  // high
    Rgb::new(215, 25, 28),   // very high
];

const CLASS_PALETTE: &[Rgb] = &[Rgb::new(77, 175, 74), Rgb::new(228, 26, 28)];

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

/// Linear interpolation between ascending stops; `t` is clamped.
///
/// An empty slice gives black.
pub fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let (Some(&first), Some(&last)) = (stops.first(), stops.last()) else {
        return Rgb::new(0, 0, 0);
    };
    if t <= first.t {
        return first.color;
    }
    if t >= last.t {
        return last.color;
    }
    stops
        .windows(2)
        .find(|w| t <= w[1].t)
        .map(|w| lerp_color(w[0].color, w[1].color, (t - w[0].t) / (w[1].t - w[0].t)))
        .unwrap_or(last.color)
}

/// Pick one of `palette.len()` equal-width bins of [0, 1]
fn discrete(palette: &[Rgb], t: f64) -> Rgb {
    let n = palette.len();
    let idx = (t.clamp(0.0, 1.0) * n as f64).floor() as usize;
    palette[idx.min(n - 1)]
}

/// Evaluate a scheme at normalized position `t` in [0, 1].
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Susceptibility => multi_stop(SUSCEPTIBILITY_STOPS, t),
        ColorScheme::Levels => discrete(LEVEL_PALETTE, t),
        ColorScheme::Classes => discrete(CLASS_PALETTE, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_stop_edge_slices() {
        assert_eq!(multi_stop(&[], 0.5), Rgb::new(0, 0, 0));
        let single = [ColorStop::new(0.3, 10, 20, 30)];
        assert_eq!(multi_stop(&single, 0.0), Rgb::new(10, 20, 30));
        assert_eq!(multi_stop(&single, 0.9), Rgb::new(10, 20, 30));
    }

    #[test]
    fn susceptibility_endpoints() {
        assert_eq!(evaluate(ColorScheme::Susceptibility, 0.0), Rgb::new(26, 152, 80));
        assert_eq!(evaluate(ColorScheme::Susceptibility, 1.0), Rgb::new(215, 48, 39));
        assert_eq!(evaluate(ColorScheme::Susceptibility, 0.5), Rgb::new(255, 255, 191));
    }

    #[test]
    fn interpolation_between_stops() {
        let stops = [ColorStop::new(0.0, 0, 0, 0), ColorStop::new(1.0, 200, 100, 50)];
        assert_eq!(multi_stop(&stops, 0.5), Rgb::new(100, 50, 25));
    }

    #[test]
    fn clamping_outside_range() {
        assert_eq!(evaluate(ColorScheme::Susceptibility, -0.5), Rgb::new(26, 152, 80));
        assert_eq!(evaluate(ColorScheme::Susceptibility, 1.5), Rgb::new(215, 48, 39));
    }

    #[test]
    fn levels_are_discrete() {
        assert_eq!(evaluate(ColorScheme::Levels, 0.0), LEVEL_PALETTE[0]);
        assert_eq!(evaluate(ColorScheme::Levels, 0.5), LEVEL_PALETTE[2]);
        assert_eq!(evaluate(ColorScheme::Levels, 1.0), LEVEL_PALETTE[4]);
        assert_eq!(evaluate(ColorScheme::Classes, 0.2), CLASS_PALETTE[0]);
        assert_eq!(evaluate(ColorScheme::Classes, 0.9), CLASS_PALETTE[1]);
    }

    #[test]
    fn grayscale_midpoint() {
        assert_eq!(evaluate(ColorScheme::Grayscale, 0.5), Rgb::new(128, 128, 128));
    }

    #[test]
    fn parse_names() {
        assert_eq!("Levels".parse::<ColorScheme>(), Ok(ColorScheme::Levels));
        for &scheme in ColorScheme::ALL {
            assert_eq!(scheme.to_string().parse::<ColorScheme>(), Ok(scheme));
        }
        assert!("terrain".parse::<ColorScheme>().is_err());
    }
}
