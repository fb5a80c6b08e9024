//! Résolution des `#include`.
//!
//! Côté Rust, un fournisseur est un `IncludeHandler` : nom de fichier demandé
//! par le moteur → texte, ou `None` si introuvable. Côté moteur, il est
//! présenté sous forme d'objet COM `IDxcIncludeHandler` (le pont), construit
//! pour la durée d'une compilation.
//!
//! Les noms sont transmis tels que le moteur les formule, préfixe `./` compris.

use core::ffi::c_void;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use dxbridge_core::encoding::wide_to_utf8_lossy;
use dxbridge_sys::com::{ComPtr, Guid, HResult, IUnknown, IUnknownVtbl, Interface};
use dxbridge_sys::dxc::{read_wide_cstr, IDxcBlob, IDxcIncludeHandler, IDxcIncludeHandlerVtbl, IDxcUtils, Lpcwstr};
use log::{debug, trace, warn};

/* ─────────────────────────── Fournisseurs ─────────────────────────── */

/// Fournit le texte d'un fichier inclus.
pub trait IncludeHandler {
    /// Texte de `filename`, ou `None` si le fichier est introuvable.
    fn load_source(&mut self, filename: &str) -> Option<String>;
}

impl<F> IncludeHandler for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn load_source(&mut self, filename: &str) -> Option<String> {
        self(filename)
    }
}

/// Normalise un nom venant du moteur : séparateurs `/`, sans `./` initial.
fn normalize(filename: &str) -> String {
    let unified = filename.replace('\\', "/");
    let mut name = unified.as_str();
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name.to_owned()
}

/// Fichiers virtuels en mémoire.
///
/// Les clés sont normalisées : `./common.hlsl` et `common.hlsl` désignent le même fichier.
#[derive(Debug, Clone, Default)]
pub struct MemoryIncludeHandler {
    files: HashMap<String, String>,
}

impl MemoryIncludeHandler {
    /// Ensemble vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute un fichier (style builder).
    #[must_use]
    pub fn with(mut self, name: &str, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    /// Ajoute ou remplace un fichier ; renvoie l'ancien texte.
    pub fn insert(&mut self, name: &str, text: impl Into<String>) -> Option<String> {
        self.files.insert(normalize(name), text.into())
    }

    /// Nombre de fichiers.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Vrai si aucun fichier.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IncludeHandler for MemoryIncludeHandler {
    fn load_source(&mut self, filename: &str) -> Option<String> {
        self.files.get(&normalize(filename)).cloned()
    }
}

/// Recherche sur disque dans une liste ordonnée de racines.
///
/// Un chemin absolu est lu tel quel ; un chemin relatif est cherché dans
/// chaque racine, la première trouvée gagne.
#[derive(Debug, Clone, Default)]
pub struct FileSystemIncludeHandler {
    roots: Vec<PathBuf>,
}

impl FileSystemIncludeHandler {
    /// Fournisseur avec les racines données (ordre de priorité).
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self { roots: roots.into_iter().map(Into::into).collect() }
    }

    /// Ajoute une racine en fin de liste.
    pub fn push_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Racines de recherche.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn read(path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("include résolu : {}", path.display());
                Some(text)
            }
            Err(e) => {
                trace!("{} : {e}", path.display());
                None
            }
        }
    }
}

impl IncludeHandler for FileSystemIncludeHandler {
    fn load_source(&mut self, filename: &str) -> Option<String> {
        let name = normalize(filename);
        let path = Path::new(&name);
        if path.is_absolute() {
            return Self::read(path);
        }
        self.roots.iter().find_map(|root| Self::read(&root.join(path)))
    }
}

/* ─────────────────────────── Pont COM ─────────────────────────── */

/// `IDxcIncludeHandler` implémenté en Rust, adossé à un `IncludeHandler`.
///
/// Alloué sur le tas, compteur atomique initialisé à 1 (la référence du
/// `BridgeRef` créateur), détruit quand le compteur retombe à zéro.
#[repr(C)]
pub(crate) struct IncludeBridge<'h> {
    vtbl: *const IDxcIncludeHandlerVtbl,
    refs: AtomicU32,
    utils: ComPtr<IDxcUtils>,
    handler: Option<&'h mut dyn IncludeHandler>,
}

static BRIDGE_VTBL: IDxcIncludeHandlerVtbl = IDxcIncludeHandlerVtbl {
    base: IUnknownVtbl { query_interface, add_ref, release },
    load_source,
};

impl<'h> IncludeBridge<'h> {
    /// Crée le pont ; `utils` sert à fabriquer les blobs rendus au moteur.
    pub(crate) fn create(utils: &ComPtr<IDxcUtils>, handler: &'h mut dyn IncludeHandler) -> BridgeRef<'h> {
        let bridge = Box::new(Self {
            vtbl: &BRIDGE_VTBL,
            refs: AtomicU32::new(1),
            utils: utils.clone(),
            handler: Some(handler),
        });
        BridgeRef { ptr: NonNull::from(Box::leak(bridge)) }
    }
}

/// Référence possédée par la compilation en cours.
///
/// Au `Drop`, le fournisseur est détaché (un moteur qui garderait le pont
/// au-delà de l'appel obtiendrait `E_FAIL`) puis la référence est rendue.
pub(crate) struct BridgeRef<'h> {
    ptr: NonNull<IncludeBridge<'h>>,
}

impl BridgeRef<'_> {
    /// Pointeur à passer à `IDxcCompiler3::Compile`.
    pub(crate) const fn as_raw(&self) -> *mut IDxcIncludeHandler {
        self.ptr.as_ptr().cast()
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> u32 {
        // SAFETY: `self` garde une référence.
        unsafe { self.ptr.as_ref() }.refs.load(Ordering::Acquire)
    }
}

impl Drop for BridgeRef<'_> {
    fn drop(&mut self) {
        // SAFETY: pont vivant (notre référence) ; la compilation est terminée,
        // plus aucun appel concurrent à `LoadSource`.
        unsafe {
            (*self.ptr.as_ptr()).handler = None;
            release(self.ptr.as_ptr().cast());
        }
    }
}

unsafe extern "system" fn query_interface(this: *mut IUnknown, iid: *const Guid, out: *mut *mut c_void) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    if iid.is_null() {
        *out = ptr::null_mut();
        return HResult::E_POINTER;
    }
    if *iid == IUnknown::IID || *iid == IDxcIncludeHandler::IID {
        add_ref(this);
        *out = this.cast();
        HResult::S_OK
    } else {
        *out = ptr::null_mut();
        HResult::E_NOINTERFACE
    }
}

unsafe extern "system" fn add_ref(this: *mut IUnknown) -> u32 {
    (*this.cast::<IncludeBridge<'_>>()).refs.fetch_add(1, Ordering::Relaxed) + 1
}

unsafe extern "system" fn release(this: *mut IUnknown) -> u32 {
    let bridge = this.cast::<IncludeBridge<'_>>();
    let left = (*bridge).refs.fetch_sub(1, Ordering::Release) - 1;
    if left == 0 {
        core::sync::atomic::fence(Ordering::Acquire);
        drop(Box::from_raw(bridge));
    }
    left
}

unsafe extern "system" fn load_source(
    this: *mut IDxcIncludeHandler,
    filename: Lpcwstr,
    include_source: *mut *mut IDxcBlob,
) -> HResult {
    if include_source.is_null() {
        return HResult::E_POINTER;
    }
    *include_source = ptr::null_mut();

    let bridge = this.cast::<IncludeBridge<'_>>();
    let name = wide_to_utf8_lossy(&read_wide_cstr(filename));
    let Some(handler) = (*bridge).handler.as_deref_mut() else {
        warn!("LoadSource({name}) appelé hors compilation");
        return HResult::E_FAIL;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.load_source(&name))) {
        Err(_) => {
            warn!("le fournisseur d'includes a paniqué sur {name}");
            HResult::E_FAIL
        }
        Ok(None) => {
            debug!("include introuvable : {name}");
            HResult::FILE_NOT_FOUND
        }
        Ok(Some(text)) => match (*bridge).utils.create_blob_utf8(&text) {
            Ok(blob) => {
                debug!("include {name} : {} octets", text.len());
                *include_source = blob.into_raw().cast();
                HResult::S_OK
            }
            Err(hr) => {
                warn!("CreateBlob({name}) a échoué : {hr}");
                hr
            }
        },
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
