//! Statuts de la frontière C.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{CompilerCreationError, LoaderError};

/// Énumération fermée renvoyée par `dxb_loader_open` / `dxb_create_compiler`.
///
/// Les valeurs sont figées : elles font partie de l'ABI C.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Status {
    /// Succès.
    Ok = 0,
    /// Bibliothèque introuvable ou non chargeable.
    OpenLibraryError = 1,
    /// Fabrique `DxcCreateInstance2` absente.
    SymbolResolutionError = 2,
    /// Instance du moteur non créée.
    CompilerInstanceError = 3,
    /// Instance utilitaire non créée.
    UtilsInstanceError = 4,
}

impl Status {
    /// Vrai pour `Status::Ok`.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<&LoaderError> for Status {
    fn from(e: &LoaderError) -> Self {
        match e {
            LoaderError::OpenLibrary { .. } => Self::OpenLibraryError,
            LoaderError::SymbolResolution { .. } => Self::SymbolResolutionError,
        }
    }
}

impl From<&CompilerCreationError> for Status {
    fn from(e: &CompilerCreationError) -> Self {
        match e {
            CompilerCreationError::CompilerInstance { .. } => Self::CompilerInstanceError,
            CompilerCreationError::UtilsInstance { .. } => Self::UtilsInstanceError,
        }
    }
}
