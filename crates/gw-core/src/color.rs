/// Luma Rec.601 : `0.299R + 0.587G + 0.114B`, sans arrondi.
///
/// # Example
/// ```
/// use gw_core::color::luma;
/// assert!((luma(255, 0, 0) - 76.245).abs() < 1e-9);
/// ```
#[inline(always)]
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}

/// Convertit RGB → HSL. Les canaux d'entrée sont sur l'échelle [0, 255]
/// mais peuvent en sortir (étapes photométriques non clampées) ;
/// H, S, L sont retournés sur [0, 1] pour des entrées dans la plage.
///
/// # Example
/// ```
/// use gw_core::color::rgb_to_hsl;
/// let (h, s, l) = rgb_to_hsl(255.0, 0.0, 0.0);
/// assert!(h.abs() < 1e-9);
/// assert!((s - 1.0).abs() < 1e-9);
/// assert!((l - 0.5).abs() < 1e-9);
/// ```
#[must_use]
pub fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let r = r / 255.0;
    let g = g / 255.0;
    let b = b / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if (max - r).abs() < f64::EPSILON {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if (max - g).abs() < f64::EPSILON {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    (h / 6.0, s, l)
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Convertit HSL → RGB sur l'échelle [0, 255], sans arrondi.
///
/// # Example
/// ```
/// use gw_core::color::hsl_to_rgb;
/// let (r, g, b) = hsl_to_rgb(0.0, 1.0, 0.5);
/// assert!((r - 255.0).abs() < 1e-9 && g.abs() < 1e-9 && b.abs() < 1e-9);
/// ```
#[must_use]
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        let v = l * 255.0;
        return (v, v, v);
    }
    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;
    (
        hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0,
        hue_to_channel(p, q, h) * 255.0,
        hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0,
    )
}

/// Clamp sur [0, 255] avec arrondi au plus proche.
#[inline(always)]
#[must_use]
pub fn clamp_channel(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Normalise une couleur hexadécimale (`#abc`, `abc`, `#aabbcc`) en
/// `#AABBCC`. Toute entrée invalide donne `fallback`.
///
/// # Example
/// ```
/// use gw_core::color::sanitize_hex_color;
/// assert_eq!(sanitize_hex_color(" f60 ", "#000000"), "#FF6600");
/// assert_eq!(sanitize_hex_color("#12345", "#000000"), "#000000");
/// ```
#[must_use]
pub fn sanitize_hex_color(input: &str, fallback: &str) -> String {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return fallback.to_string();
    }
    let expanded: String = if digits.len() == 3 {
        digits.chars().flat_map(|c| [c, c]).collect()
    } else {
        digits.to_string()
    };
    format!("#{}", expanded.to_ascii_uppercase())
}

/// Parse une couleur hexadécimale en (r, g, b). Entrée invalide → noir.
#[must_use]
pub fn parse_hex_color(value: &str) -> (u8, u8, u8) {
    let safe = sanitize_hex_color(value, "#000000");
    let hex = &safe[1..];
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
    (channel(0), channel(2), channel(4))
}

/// Pourcentage borné sur [0, 100] ; NaN → 0.
#[must_use]
pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

#[must_use]
pub fn opacity_from_percent(percent: f64) -> f64 {
    clamp_percentage(percent) / 100.0
}

/// `rgba(r, g, b, a)` CSS string from a hex color and an opacity percentage.
///
/// # Example
/// ```
/// use gw_core::color::rgba_string;
/// assert_eq!(rgba_string("#ff0000", 50.0), "rgba(255, 0, 0, 0.50)");
/// ```
#[must_use]
pub fn rgba_string(hex: &str, percent_alpha: f64) -> String {
    let (r, g, b) = parse_hex_color(hex);
    format!(
        "rgba({r}, {g}, {b}, {:.2})",
        opacity_from_percent(percent_alpha)
    )
}

/// `#rrggbb` en minuscules.
#[must_use]
pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// `rgb(r, g, b)`, le format utilisé par le markup des glyphes.
#[must_use]
pub fn rgb_string(r: u8, g: u8, b: u8) -> String {
    format!("rgb({r}, {g}, {b})")
}

/// Parse `rgb(r, g, b)` (espaces optionnels après les virgules).
///
/// # Example
/// ```
/// use gw_core::color::parse_rgb;
/// assert_eq!(parse_rgb("rgb(1, 2,3)"), Some((1, 2, 3)));
/// assert_eq!(parse_rgb("hsl(1, 2, 3)"), None);
/// ```
#[must_use]
pub fn parse_rgb(value: &str) -> Option<(u8, u8, u8)> {
    let inner = value.trim().strip_prefix("rgb(")?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>());
    let r = parts.next()?.ok()?;
    let g = parts.next()?.ok()?;
    let b = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((r, g, b))
}

/// `rgb(r, g, b)` → `#rrggbb`.
#[must_use]
pub fn parse_rgb_to_hex(value: &str) -> Option<String> {
    parse_rgb(value).map(|(r, g, b)| rgb_to_hex(r, g, b))
}
