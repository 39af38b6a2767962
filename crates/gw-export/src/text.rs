//! Export texte brut et noms de fichiers.

use gw_ascii::markup::strip_tags;

/// Texte brut d'une frame : balises supprimées, entités décodées.
///
/// # Example
/// ```
/// use gw_export::text::to_plain_text;
/// let ascii = "<span style=\"color: rgb(0, 0, 0)\">&gt;</span>\n";
/// assert_eq!(to_plain_text(ascii), ">\n");
/// ```
#[must_use]
pub fn to_plain_text(ascii: &str) -> String {
    strip_tags(ascii)
}

/// Nettoie un nom de fichier : caractères réservés et de contrôle
/// remplacés par `_`, points initiaux retirés, blancs et `_` répétés
/// compactés, 255 caractères au plus.
///
/// # Example
/// ```
/// use gw_export::text::sanitize_filename;
/// assert_eq!(sanitize_filename("..my cat:<v2>.gif"), "my_cat_v2_.gif");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .trim_start_matches('.')
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').chars().take(255).collect()
}

/// Nom sans extension (`a/b.c.gif` → `a/b.c`).
#[must_use]
pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if !name[dot + 1..].contains('/') && dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Nom d'export dérivé d'un fichier source : `<base>-ascii`, ou `default`.
///
/// # Example
/// ```
/// use gw_export::text::export_basename;
/// assert_eq!(export_basename(Some("Cool Cat.gif"), "ascii-art"), "Cool_Cat-ascii");
/// assert_eq!(export_basename(None, "ascii-art"), "ascii-art");
/// ```
#[must_use]
pub fn export_basename(source: Option<&str>, default: &str) -> String {
    match source {
        Some(name) => format!("{}-ascii", sanitize_filename(base_name(name))),
        None => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_filename("  a  b  "), "a_b");
        assert_eq!(sanitize_filename("x\u{1}y"), "x_y");
        assert_eq!(sanitize_filename(&"z".repeat(300)).len(), 255);
    }

    #[test]
    fn base_name_keeps_dotless_names() {
        assert_eq!(base_name("anim"), "anim");
        assert_eq!(base_name("dir.v2/anim"), "dir.v2/anim");
        assert_eq!(base_name(".hidden"), ".hidden");
    }
}
