//! Erreurs de setup et de compilation.

use thiserror::Error;

/// Échec d'ouverture du moteur.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    /// Bibliothèque introuvable ou non chargeable.
    #[error("impossible d'ouvrir {library}: {reason}")]
    OpenLibrary {
        /// Nom de fichier recherché via le chemin de recherche standard.
        library: String,
        /// Message du chargeur dynamique.
        reason: String,
    },

    /// Fabrique absente de la bibliothèque (la bibliothèque a été déchargée).
    #[error("symbole {symbol} introuvable dans {library}: {reason}")]
    SymbolResolution {
        /// Nom de la bibliothèque ouverte.
        library: String,
        /// Symbole recherché.
        symbol: &'static str,
        /// Message du chargeur dynamique.
        reason: String,
    },
}

/// Échec de création d'un compilateur ; distingue le moteur de l'objet utilitaire.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CompilerCreationError {
    /// `DxcCreateInstance2(CLSID_DxcCompiler)` a échoué.
    #[error("création de l'instance DxcCompiler échouée (hr=0x{hresult:08X})")]
    CompilerInstance {
        /// HRESULT renvoyé par la fabrique.
        hresult: u32,
    },

    /// `DxcCreateInstance2(CLSID_DxcUtils)` a échoué.
    #[error("création de l'instance DxcUtils échouée (hr=0x{hresult:08X})")]
    UtilsInstance {
        /// HRESULT renvoyé par la fabrique.
        hresult: u32,
    },
}

/// Compilation sans bytecode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// L'appel au moteur a échoué avant de produire un diagnostic.
    #[error("échec de l'invocation du compilateur (aucun diagnostic)")]
    Invocation,

    /// Le moteur a tourné et a rejeté le shader.
    #[error("compilation échouée:\n{0}")]
    Diagnostics(String),
}

impl CompilationError {
    /// Construit l'erreur depuis un diagnostic éventuellement vide.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() { Self::Invocation } else { Self::Diagnostics(message) }
    }

    /// Texte du diagnostic (vide pour `Invocation`).
    pub fn message(&self) -> &str {
        match self {
            Self::Invocation => "",
            Self::Diagnostics(m) => m,
        }
    }
}
