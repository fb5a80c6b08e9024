//! Chargement dynamique de `dxcompiler`.
//!
//! `Loader` possède la bibliothèque ouverte et la fabrique `DxcCreateInstance2`
//! résolue. Il est partagé (`Arc`) : chaque objet créé à partir de lui en garde
//! un clone, de sorte que la bibliothèque reste chargée tant qu'un objet COM
//! issu de son code est vivant, même si le handle d'origine est fermé.

use core::ffi::c_void;
use core::fmt;
use core::ptr;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;

use dxbridge_core::LoaderError;
use libloading::Library;
use log::{debug, warn};

use crate::com::{ComPtr, Guid, HResult, Interface};

/// Symbole de fabrique exporté par `dxcompiler`.
pub const CREATE_INSTANCE_SYMBOL: &str = "DxcCreateInstance2";

/// `DxcCreateInstance2(pMalloc, rclsid, riid, ppv)`
pub type DxcCreateInstance2Proc = unsafe extern "system" fn(
    malloc: *mut c_void,
    clsid: *const Guid,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> HResult;

struct Inner {
    name: String,
    create_instance2: DxcCreateInstance2Proc,
    // déclarée en dernier : déchargée après tout le reste
    _library: Library,
}

/// Bibliothèque DXC chargée. `Clone` = nouvelle référence partagée.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<Inner>,
}

impl Loader {
    /// Nom de fichier de la bibliothèque pour la plateforme courante
    /// (`libdxcompiler.so`, `libdxcompiler.dylib`, `dxcompiler.dll`).
    pub fn library_name() -> OsString {
        libloading::library_filename("dxcompiler")
    }

    /// Ouvre `dxcompiler` via la recherche standard du système et résout la fabrique.
    pub fn open() -> Result<Self, LoaderError> {
        Self::open_file(&Self::library_name())
    }

    fn open_file(file: &OsStr) -> Result<Self, LoaderError> {
        let name = file.to_string_lossy().into_owned();

        // SAFETY: l'initialisation de dxcompiler n'a pas de préconditions côté appelant.
        let library = unsafe { Library::new(file) }.map_err(|e| {
            warn!("ouverture de {name} impossible : {e}");
            LoaderError::OpenLibrary { library: name.clone(), reason: e.to_string() }
        })?;

        let symbol = format!("{CREATE_INSTANCE_SYMBOL}\0");
        // SAFETY: la signature correspond à `DxcCreateInstance2` de dxcapi.h ;
        // le pointeur copié reste valide tant que `library` est gardée dans `Inner`.
        let create_instance2 = unsafe { library.get::<DxcCreateInstance2Proc>(symbol.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|e| {
                warn!("{CREATE_INSTANCE_SYMBOL} introuvable dans {name} : {e}");
                LoaderError::SymbolResolution {
                    library: name.clone(),
                    symbol: CREATE_INSTANCE_SYMBOL,
                    reason: e.to_string(),
                }
            })?;

        debug!("{name} chargée, {CREATE_INSTANCE_SYMBOL} résolu");
        Ok(Self { inner: Arc::new(Inner { name, create_instance2, _library: library }) })
    }

    /// Nom sous lequel la bibliothèque a été ouverte.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Nombre de références vivantes (handles + objets qui gardent la bibliothèque).
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Crée une instance de `clsid` exposant l'interface `T`.
    pub fn create_instance<T: Interface>(&self, clsid: &Guid) -> Result<ComPtr<T>, HResult> {
        let out = self.create_raw(clsid, &T::IID)?;
        // SAFETY: succès → `out` est un `T` avec une référence pour nous.
        unsafe { ComPtr::from_raw(out.cast::<T>()) }.ok_or(HResult::E_POINTER)
    }

    /// Appel brut de la fabrique : en cas de succès, pointeur sur l'interface
    /// `iid` portant une référence cédée à l'appelant (éventuellement NULL).
    pub fn create_raw(&self, clsid: &Guid, iid: &Guid) -> Result<*mut c_void, HResult> {
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: fabrique résolue sur une bibliothèque toujours chargée (`self.inner`) ;
        // allocateur nul = allocateur par défaut du moteur.
        let hr = unsafe { (self.inner.create_instance2)(ptr::null_mut(), clsid, iid, &mut out) };
        if hr.is_err() {
            debug!("DxcCreateInstance2({clsid}) a échoué : {hr}");
            return Err(hr);
        }
        Ok(out)
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").field("library", &self.inner.name).field("refs", &self.ref_count()).finish()
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
