//! dxbridge-core — primitives partagées du pont DXC
//!
//! Fournit :
//! - `encoding` : UTF-8 ↔ UTF-16, `WideChar` (le `wchar_t` natif du moteur),
//!   décodage d'un blob texte selon sa page de code
//! - `Profile` : profil de compilation figé (arguments DXC non configurables)
//! - `Status` : énumération fermée renvoyée par la frontière C
//! - Erreurs de setup `LoaderError` / `CompilerCreationError` / `CompilationError`
//!
//! Features :
//! - `serde` : derive `Serialize` sur `Status` et `Profile` (rapports JSON)

#![deny(missing_docs)]
#![forbid(unsafe_code)]

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Conversions de texte entre la frontière (UTF-8) et le moteur (wchar_t).
pub mod encoding;

mod error;
mod profile;
mod status;

pub use encoding::{CodePage, EncodingError, WideChar};
pub use error::{CompilationError, CompilerCreationError, LoaderError};
pub use profile::Profile;
pub use status::Status;

/* ─────────────────────────── SPIR-V ─────────────────────────── */

/// Mot magique en tête de tout module SPIR-V (little-endian).
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Vrai si `bytes` commence par le mot magique SPIR-V et a une taille multiple de 4.
pub fn is_spirv(bytes: &[u8]) -> bool {
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return false;
    }
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == SPIRV_MAGIC
}

/* ─────────────────────────── Tests ─────────────────────────── */
