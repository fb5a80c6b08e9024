//! dxbridge-compiler — API sûre du pont DXC
//!
//! ```no_run
//! use dxbridge_compiler::{Compiler, Loader, MemoryIncludeHandler};
//!
//! let loader = Loader::open()?;
//! let mut compiler = Compiler::new(&loader)?;
//!
//! let mut includes = MemoryIncludeHandler::new().with("common.hlsl", "float4 red() { return float4(1,0,0,1); }");
//! let source = "#include \"common.hlsl\"\nfloat4 main() : SV_Position { return red(); }";
//!
//! let spirv = compiler.compile(source, Some(&mut includes)).into_result()?;
//! assert!(dxbridge_compiler::is_spirv(&spirv));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Contenu :
//! - `Compiler` : instance moteur + utilitaires, profil figé `vs_6_5` → SPIR-V
//! - `CompilationOutcome` : succès (bytecode) ou échec (diagnostic)
//! - `IncludeHandler` et fournisseurs fournis (mémoire, système de fichiers, closures)
//!
//! Feature `tracing` : span `debug` autour de `Compiler::compile`.

mod compiler;
mod include;
mod outcome;

#[cfg(test)]
mod fake;

pub use compiler::Compiler;
pub use include::{FileSystemIncludeHandler, IncludeHandler, MemoryIncludeHandler};
pub use outcome::CompilationOutcome;

pub use dxbridge_core::{is_spirv, CompilationError, CompilerCreationError, LoaderError, Profile, Status};
pub use dxbridge_sys::Loader;
