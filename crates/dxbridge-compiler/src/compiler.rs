//! Compilateur HLSL → SPIR-V.
//!
//! Un `Compiler` possède une instance `IDxcCompiler3` et une instance
//! `IDxcUtils`, créées par la fabrique du `Loader`, et garde un clone du
//! `Loader` : la bibliothèque reste chargée tant que le compilateur vit, même
//! si l'appelant ferme son propre handle avant.

use core::ffi::c_void;
use core::ptr;

use dxbridge_core::{CompilerCreationError, Profile};
use dxbridge_sys::dxc::{IDxcCompiler3, IDxcUtils, CLSID_DXC_COMPILER, CLSID_DXC_UTILS};
use dxbridge_sys::{ComPtr, Guid, HResult, Interface, Loader};
use log::{debug, warn};

use crate::include::{BridgeRef, IncludeBridge, IncludeHandler};
use crate::outcome::CompilationOutcome;

/// Compilateur prêt à l'emploi (profil `Profile::VertexSpirv`).
pub struct Compiler {
    compiler: ComPtr<IDxcCompiler3>,
    utils: ComPtr<IDxcUtils>,
    profile: Profile,
    // dernier champ : libéré après les deux objets COM ci-dessus
    loader: Loader,
}

// SAFETY: les objets DXC n'ont pas d'affinité de thread ; `compile` prend
// `&mut self`, donc au plus un appel en cours par instance.
unsafe impl Send for Compiler {}

impl Compiler {
    /// Crée le moteur puis les utilitaires. En cas d'échec, ce qui a déjà été
    /// créé est relâché.
    pub fn new(loader: &Loader) -> Result<Self, CompilerCreationError> {
        // SAFETY: `create_raw` respecte le contrat de `DxcCreateInstance2`.
        let (compiler, utils) = unsafe { create_pair(|clsid, iid| loader.create_raw(clsid, iid)) }?;
        debug!("compilateur créé depuis {}", loader.name());
        Ok(Self { compiler, utils, profile: Profile::default(), loader: loader.clone() })
    }

    /// Profil utilisé pour chaque compilation.
    pub const fn profile(&self) -> Profile {
        self.profile
    }

    /// Compile `source` de façon synchrone.
    ///
    /// Sans fournisseur, tout `#include` échoue côté moteur.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(bytes = source.len(), includes = include.is_some()))
    )]
    pub fn compile(&mut self, source: &str, include: Option<&mut dyn IncludeHandler>) -> CompilationOutcome {
        run(&self.compiler, &self.utils, self.profile, source, include)
    }
}

impl core::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compiler").field("profile", &self.profile).field("loader", &self.loader).finish()
    }
}

/// Instancie le moteur puis les utilitaires via `factory(clsid, iid)`.
///
/// # Safety
/// En cas de succès, `factory` rend NULL ou un pointeur sur l'interface `iid`
/// portant une référence cédée.
unsafe fn create_pair<F>(factory: F) -> Result<(ComPtr<IDxcCompiler3>, ComPtr<IDxcUtils>), CompilerCreationError>
where
    F: Fn(&Guid, &Guid) -> Result<*mut c_void, HResult>,
{
    let compiler = instance::<IDxcCompiler3, _>(&factory, &CLSID_DXC_COMPILER)
        .map_err(|hr| CompilerCreationError::CompilerInstance { hresult: hr.code() })?;
    // en cas d'échec ici, `compiler` est relâché au retour
    let utils = instance::<IDxcUtils, _>(&factory, &CLSID_DXC_UTILS)
        .map_err(|hr| CompilerCreationError::UtilsInstance { hresult: hr.code() })?;
    Ok((compiler, utils))
}

unsafe fn instance<T, F>(factory: &F, clsid: &Guid) -> Result<ComPtr<T>, HResult>
where
    T: Interface,
    F: Fn(&Guid, &Guid) -> Result<*mut c_void, HResult>,
{
    let raw = factory(clsid, &T::IID)?;
    ComPtr::from_raw(raw.cast::<T>()).ok_or(HResult::E_POINTER)
}

/// Une compilation complète : appel moteur, statut, puis bytecode ou diagnostic.
fn run(
    compiler: &ComPtr<IDxcCompiler3>,
    utils: &ComPtr<IDxcUtils>,
    profile: Profile,
    source: &str,
    include: Option<&mut dyn IncludeHandler>,
) -> CompilationOutcome {
    let bridge = include.map(|handler| IncludeBridge::create(utils, handler));
    let handler = bridge.as_ref().map_or(ptr::null_mut(), BridgeRef::as_raw);

    // SAFETY: `bridge` vit jusqu'à la fin de la fonction, donc pendant tout l'appel.
    let result = match unsafe { compiler.compile(source.as_bytes(), profile.arguments(), handler) } {
        Ok(result) => result,
        Err(hr) => {
            warn!("IDxcCompiler3::Compile a échoué : {hr}");
            return CompilationOutcome::failure(String::new());
        }
    };

    let status = match result.status() {
        Ok(status) => status,
        Err(hr) => {
            warn!("statut de compilation illisible : {hr}");
            return CompilationOutcome::failure(String::new());
        }
    };

    if status.is_ok() {
        return match result.result_blob() {
            Ok(blob) => {
                debug!("compilation réussie : {} octets", blob.as_bytes().len());
                CompilationOutcome::success(blob.as_bytes().to_vec())
            }
            Err(hr) => {
                warn!("sortie de compilation absente : {hr}");
                CompilationOutcome::failure(String::new())
            }
        };
    }

    let message = result.error_buffer().and_then(|errors| errors.to_utf8()).unwrap_or_else(|hr| {
        warn!("diagnostic illisible : {hr}");
        String::new()
    });
    debug!("compilation échouée ({status})");
    CompilationOutcome::failure(message)
}

/* ─────────────────────────── Tests ─────────────────────────── */
