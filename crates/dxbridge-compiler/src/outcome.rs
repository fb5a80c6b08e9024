//! Résultat d'une compilation.

use dxbridge_core::CompilationError;

/// Résultat d'un appel à `Compiler::compile`.
///
/// Exactement un des deux est présent : le bytecode (succès) ou le diagnostic
/// (échec). Un échec d'invocation du moteur porte un diagnostic vide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationOutcome {
    /// Bytecode produit (copie possédée).
    Success(Vec<u8>),
    /// Diagnostic UTF-8, vide si le moteur n'en a produit aucun.
    Failure(String),
}

impl CompilationOutcome {
    pub(crate) const fn success(bytecode: Vec<u8>) -> Self {
        Self::Success(bytecode)
    }

    pub(crate) const fn failure(message: String) -> Self {
        Self::Failure(message)
    }

    /// Vrai si du bytecode a été produit.
    pub const fn is_successful(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Diagnostic (`None` en cas de succès).
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }

    /// Bytecode, vide en cas d'échec.
    pub fn bytecode(&self) -> &[u8] {
        match self {
            Self::Success(bytes) => bytes,
            Self::Failure(_) => &[],
        }
    }

    /// Vrai si le bytecode est un module SPIR-V (mot magique en tête).
    pub fn is_spirv(&self) -> bool {
        dxbridge_core::is_spirv(self.bytecode())
    }

    /// Conversion vers `Result`, pour `?`.
    pub fn into_result(self) -> Result<Vec<u8>, CompilationError> {
        match self {
            Self::Success(bytes) => Ok(bytes),
            Self::Failure(message) => Err(CompilationError::from_message(message)),
        }
    }
}

impl From<CompilationOutcome> for Result<Vec<u8>, CompilationError> {
    fn from(outcome: CompilationOutcome) -> Self {
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxbridge_core::SPIRV_MAGIC;
    use pretty_assertions::assert_eq;

    fn module() -> Vec<u8> {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 3, 1, 0]);
        bytes
    }

    #[test]
    fn success_has_bytecode_only() {
        let o = CompilationOutcome::success(module());
        assert!(o.is_successful());
        assert_eq!(o.error_message(), None);
        assert_eq!(o.bytecode().len(), 8);
        assert!(o.is_spirv());
        assert_eq!(o.into_result(), Ok(module()));
    }

    #[test]
    fn failure_has_message_only() {
        let o = CompilationOutcome::failure("shader.hlsl:1:5: error: expected ';'".into());
        assert!(!o.is_successful());
        assert_eq!(o.error_message(), Some("shader.hlsl:1:5: error: expected ';'"));
        assert!(o.bytecode().is_empty());
        assert!(!o.is_spirv());
        assert_eq!(
            o.into_result(),
            Err(CompilationError::Diagnostics("shader.hlsl:1:5: error: expected ';'".into()))
        );
    }

    #[test]
    fn invocation_failure_has_empty_message() {
        let o = CompilationOutcome::failure(String::new());
        assert_eq!(o.error_message(), Some(""));
        let r: Result<Vec<u8>, CompilationError> = o.into();
        assert_eq!(r, Err(CompilationError::Invocation));
    }
}
