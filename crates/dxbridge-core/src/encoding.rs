//! Conversions de texte.
//!
//! Tout ce qui traverse la frontière C est en UTF-8. Le moteur DXC, lui, parle
//! `wchar_t` : UTF-16 sous Windows, UTF-32 ailleurs (`wchar_t` fait 32 bits
//! sous Linux/macOS). `WideChar` suit donc la plateforme, et les fonctions
//! `*_wide*` choisissent le bon encodage.
//!
//! Les conversions sont totales et sans perte pour une entrée valide ; les
//! variantes `*_lossy` remplacent les séquences invalides par U+FFFD.

use thiserror::Error;

/// Unité de code du `wchar_t` natif du moteur.
#[cfg(windows)]
pub type WideChar = u16;

/// Unité de code du `wchar_t` natif du moteur.
#[cfg(not(windows))]
pub type WideChar = u32;

/* ─────────────────────────── Pages de code ─────────────────────────── */

/// Page de code déclarée par un blob texte du moteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodePage(pub u32);

impl CodePage {
    /// UTF-8 (`CP_UTF8`).
    pub const UTF8: Self = Self(65001);
    /// UTF-16 little-endian (`DXC_CP_UTF16`).
    pub const UTF16: Self = Self(1200);
    /// UTF-32 little-endian (`DXC_CP_UTF32`).
    pub const UTF32: Self = Self(12000);

    /// Page de code du `wchar_t` natif (`DXC_CP_WIDE`).
    #[cfg(windows)]
    pub const WIDE: Self = Self::UTF16;
    /// Page de code du `wchar_t` natif (`DXC_CP_WIDE`).
    #[cfg(not(windows))]
    pub const WIDE: Self = Self::UTF32;
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Texte non convertible.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// Surrogate UTF-16 orphelin.
    #[error("surrogate UTF-16 orphelin 0x{unit:04X} à l'index {index}")]
    UnpairedSurrogate {
        /// Index (en unités de code) du surrogate fautif.
        index: usize,
        /// Valeur du surrogate.
        unit: u16,
    },

    /// Valeur UTF-32 hors des scalaires Unicode.
    #[error("scalaire UTF-32 invalide 0x{value:08X} à l'index {index}")]
    InvalidScalar {
        /// Index (en unités de code) de la valeur fautive.
        index: usize,
        /// Valeur lue.
        value: u32,
    },
}

/* ─────────────────────────── UTF-8 ↔ UTF-16 ─────────────────────────── */

/// Encode une chaîne UTF-8 en unités UTF-16 (sans terminateur).
pub fn utf8_to_utf16(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

/// Décode des unités UTF-16 ; échoue sur un surrogate orphelin.
pub fn utf16_to_utf8(units: &[u16]) -> Result<String, EncodingError> {
    let mut out = String::with_capacity(units.len());
    let mut index = 0;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => {
                out.push(c);
                index += c.len_utf16();
            }
            Err(e) => {
                return Err(EncodingError::UnpairedSurrogate { index, unit: e.unpaired_surrogate() });
            }
        }
    }
    Ok(out)
}

/// Décode des unités UTF-16, surrogates orphelins remplacés par U+FFFD.
pub fn utf16_to_utf8_lossy(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/* ─────────────────────────── UTF-8 ↔ UTF-32 ─────────────────────────── */

/// Encode une chaîne UTF-8 en scalaires UTF-32 (sans terminateur).
pub fn utf8_to_utf32(text: &str) -> Vec<u32> {
    text.chars().map(u32::from).collect()
}

/// Décode des scalaires UTF-32 ; échoue sur une valeur hors Unicode.
pub fn utf32_to_utf8(units: &[u32]) -> Result<String, EncodingError> {
    units
        .iter()
        .enumerate()
        .map(|(index, &value)| char::from_u32(value).ok_or(EncodingError::InvalidScalar { index, value }))
        .collect()
}

/// Décode des scalaires UTF-32, valeurs invalides remplacées par U+FFFD.
pub fn utf32_to_utf8_lossy(units: &[u32]) -> String {
    units.iter().map(|&v| char::from_u32(v).unwrap_or(char::REPLACEMENT_CHARACTER)).collect()
}

/* ─────────────────────────── wchar_t natif ─────────────────────────── */

/// Encode vers le `wchar_t` natif, sans terminateur.
pub fn to_wide(text: &str) -> Vec<WideChar> {
    #[cfg(windows)]
    {
        utf8_to_utf16(text)
    }
    #[cfg(not(windows))]
    {
        utf8_to_utf32(text)
    }
}

/// Encode vers le `wchar_t` natif avec terminateur NUL (prêt pour un `LPCWSTR`).
pub fn to_wide_nul(text: &str) -> Vec<WideChar> {
    let mut wide = to_wide(text);
    wide.push(0);
    wide
}

/// Décode du `wchar_t` natif (sans terminateur).
pub fn wide_to_utf8(units: &[WideChar]) -> Result<String, EncodingError> {
    #[cfg(windows)]
    {
        utf16_to_utf8(units)
    }
    #[cfg(not(windows))]
    {
        utf32_to_utf8(units)
    }
}

/// Décode du `wchar_t` natif en remplaçant les unités invalides.
pub fn wide_to_utf8_lossy(units: &[WideChar]) -> String {
    #[cfg(windows)]
    {
        utf16_to_utf8_lossy(units)
    }
    #[cfg(not(windows))]
    {
        utf32_to_utf8_lossy(units)
    }
}

/* ─────────────────────────── Blobs texte ─────────────────────────── */

/// Extrait le texte UTF-8 d'un buffer dont l'encodage est déclaré par `code_page`
/// (`None` = encodage inconnu).
///
/// UTF-8 est copié tel quel, UTF-32 décodé s'il est déclaré, tout le reste est
/// supposé UTF-16. Les terminateurs NUL finaux sont ignorés.
pub fn decode_blob_text(bytes: &[u8], code_page: Option<CodePage>) -> String {
    match code_page {
        Some(CodePage::UTF8) => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Some(CodePage::UTF32) => {
            let units: Vec<u32> = bytes
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            utf32_to_utf8_lossy(trim_nul(&units))
        }
        _ => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]])).collect();
            utf16_to_utf8_lossy(trim_nul(&units))
        }
    }
}

fn trim_nul<T: Copy + Default + PartialEq>(units: &[T]) -> &[T] {
    let zero = T::default();
    let end = units.iter().rposition(|&u| u != zero).map_or(0, |i| i + 1);
    &units[..end]
}

/* ─────────────────────────── Tests ─────────────────────────── */
