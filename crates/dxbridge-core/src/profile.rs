//! Profils de compilation figés.
//!
//! Les arguments passés au moteur ne sont jamais fournis par l'appelant : chaque
//! cible supportée est une variante de `Profile` dont la liste d'arguments est
//! constante. Ajouter une cible = ajouter une variante.

#[cfg(feature = "serde")]
use serde::Serialize;

/// Cible de compilation (étape, modèle de shader, format de sortie).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[non_exhaustive]
pub enum Profile {
    /// Vertex shader `vs_6_5`, point d'entrée `main`, SPIR-V pour Vulkan 1.3.
    #[default]
    VertexSpirv,
}

impl Profile {
    /// Arguments DXC, dans l'ordre où ils sont transmis.
    pub const fn arguments(self) -> &'static [&'static str] {
        match self {
            Self::VertexSpirv => &["-spirv", "-fspv-target-env=vulkan1.3", "-E", "main", "-T", "vs_6_5"],
        }
    }

    /// Nom du point d'entrée.
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::VertexSpirv => "main",
        }
    }

    /// Profil cible DXC (`-T`).
    pub const fn target_profile(self) -> &'static str {
        match self {
            Self::VertexSpirv => "vs_6_5",
        }
    }

    /// Environnement SPIR-V visé.
    pub const fn target_env(self) -> &'static str {
        match self {
            Self::VertexSpirv => "vulkan1.3",
        }
    }
}
