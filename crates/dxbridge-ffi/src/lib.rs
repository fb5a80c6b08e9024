//! dxbridge — frontière C
//!
//! API à handles opaques, sans comptage de références côté appelant :
//! - `DxbLoader` : bibliothèque DXC chargée (`dxb_loader_open` / `dxb_loader_close`)
//! - `DxbCompiler` : instance moteur (`dxb_create_compiler` / `dxb_compiler_release`)
//! - `DxbOutcome` : résultat d'un `dxb_compile` (`dxb_outcome_*`, `dxb_outcome_free`)
//!
//! Règles communes :
//! - handle NULL passé à close/release/free : ignoré
//! - handle NULL passé à un accesseur : `false` / NULL / longueur 0
//! - aucune panique ne traverse la frontière
//! - un `DxbCompiler` ne supporte qu'un `dxb_compile` à la fois
//!
//! Voir `include/dxbridge.h`.

use core::ffi::{c_char, c_void};
use core::ptr;
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use dxbridge_compiler::{CompilationOutcome, Compiler, IncludeHandler, Loader};
use log::{debug, error};

mod callback;

pub use callback::{DxbIncludeCallback, DxbIncludeFn};
use callback::CallbackInclude;

/// Statut des opérations de setup (valeurs figées, cf. `dxbridge.h`).
pub use dxbridge_core::Status as DxbStatus;

/* ─────────────────────────── Handles ─────────────────────────── */

/// Bibliothèque DXC chargée.
pub struct DxbLoader {
    loader: Loader,
}

/// Compilateur ; garde la bibliothèque chargée indépendamment de son `DxbLoader`.
pub struct DxbCompiler {
    compiler: Compiler,
}

/// Résultat de compilation possédé par l'appelant.
pub struct DxbOutcome {
    outcome: CompilationOutcome,
    // copie terminée par NUL pour `dxb_outcome_error_message`
    message: Option<CString>,
}

impl DxbOutcome {
    fn new(outcome: CompilationOutcome) -> Self {
        let message = outcome
            .error_message()
            .map(|m| CString::new(m.replace('\0', "\u{FFFD}")).unwrap_or_default());
        Self { outcome, message }
    }

    fn into_raw(self) -> *mut Self {
        Box::into_raw(Box::new(self))
    }
}

/// Exécute `f` sans laisser échapper de panique ; `fallback` sinon.
fn guard<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("panique interceptée dans {name}");
        fallback
    })
}

/* ─────────────────────────── Loader ─────────────────────────── */

/// Ouvre `dxcompiler` et résout sa fabrique.
///
/// # Safety
/// `out` est NULL ou pointe vers un `DxbLoader *` inscriptible. Il reçoit NULL en cas d'échec.
#[no_mangle]
pub unsafe extern "C" fn dxb_loader_open(out: *mut *mut DxbLoader) -> DxbStatus {
    if out.is_null() {
        return DxbStatus::OpenLibraryError;
    }
    *out = ptr::null_mut();
    let opened = guard("dxb_loader_open", None, || Some(Loader::open()));
    match opened {
        Some(Ok(loader)) => {
            *out = Box::into_raw(Box::new(DxbLoader { loader }));
            DxbStatus::Ok
        }
        Some(Err(e)) => {
            debug!("dxb_loader_open : {e}");
            DxbStatus::from(&e)
        }
        None => DxbStatus::OpenLibraryError,
    }
}

/// Ferme un handle de loader. Les compilateurs déjà créés restent valides.
///
/// # Safety
/// `loader` est NULL ou un handle issu de `dxb_loader_open`, non encore fermé.
#[no_mangle]
pub unsafe extern "C" fn dxb_loader_close(loader: *mut DxbLoader) {
    if !loader.is_null() {
        guard("dxb_loader_close", (), || drop(Box::from_raw(loader)));
    }
}

/* ─────────────────────────── Compiler ─────────────────────────── */

/// Crée un compilateur.
///
/// # Safety
/// `loader` est NULL ou un handle vivant ; `out` est NULL ou inscriptible. `out` reçoit NULL en cas d'échec.
#[no_mangle]
pub unsafe extern "C" fn dxb_create_compiler(loader: *const DxbLoader, out: *mut *mut DxbCompiler) -> DxbStatus {
    if out.is_null() || loader.is_null() {
        if !out.is_null() {
            *out = ptr::null_mut();
        }
        return DxbStatus::CompilerInstanceError;
    }
    *out = ptr::null_mut();
    let created = guard("dxb_create_compiler", None, || Some(Compiler::new(&(*loader).loader)));
    match created {
        Some(Ok(compiler)) => {
            *out = Box::into_raw(Box::new(DxbCompiler { compiler }));
            DxbStatus::Ok
        }
        Some(Err(e)) => {
            debug!("dxb_create_compiler : {e}");
            DxbStatus::from(&e)
        }
        None => DxbStatus::CompilerInstanceError,
    }
}

/// Libère un compilateur (les deux références moteur sont rendues).
///
/// # Safety
/// `compiler` est NULL ou un handle issu de `dxb_create_compiler`, non encore libéré,
/// sans `dxb_compile` en cours.
#[no_mangle]
pub unsafe extern "C" fn dxb_compiler_release(compiler: *mut DxbCompiler) {
    if !compiler.is_null() {
        guard("dxb_compiler_release", (), || drop(Box::from_raw(compiler)));
    }
}

/* ─────────────────────────── Compile ─────────────────────────── */

/// Compile `source` (UTF-8, terminé par NUL). Renvoie toujours un `DxbOutcome`
/// à libérer avec `dxb_outcome_free`.
///
/// `include` peut être NULL : tout `#include` échoue alors. Sinon il est appelé
/// de façon synchrone, depuis ce thread, avec `user_data`.
///
/// Handle ou source NULL, ou source non UTF-8 : échec sans diagnostic.
///
/// # Safety
/// `compiler` est NULL ou un handle vivant non utilisé simultanément ailleurs ;
/// `source` est NULL ou une chaîne terminée par NUL ; `include`/`user_data`
/// restent valides pendant l'appel.
#[no_mangle]
pub unsafe extern "C" fn dxb_compile(
    compiler: *mut DxbCompiler,
    source: *const c_char,
    include: DxbIncludeCallback,
    user_data: *mut c_void,
) -> *mut DxbOutcome {
    let invalid = || CompilationOutcome::Failure(String::new());
    if compiler.is_null() || source.is_null() {
        return DxbOutcome::new(invalid()).into_raw();
    }
    let Ok(text) = CStr::from_ptr(source).to_str() else {
        debug!("dxb_compile : source non UTF-8");
        return DxbOutcome::new(invalid()).into_raw();
    };

    let compiler = &mut (*compiler).compiler;
    let outcome = guard("dxb_compile", invalid(), || {
        let mut adapter = include.map(|f| CallbackInclude::new(f, user_data));
        compiler.compile(text, adapter.as_mut().map(|a| a as &mut dyn IncludeHandler))
    });
    DxbOutcome::new(outcome).into_raw()
}

/* ─────────────────────────── Outcome ─────────────────────────── */

/// Vrai si la compilation a produit du bytecode.
///
/// # Safety
/// `outcome` est NULL ou un handle vivant.
#[no_mangle]
pub unsafe extern "C" fn dxb_outcome_is_successful(outcome: *const DxbOutcome) -> bool {
    !outcome.is_null() && (*outcome).outcome.is_successful()
}

/// Diagnostic UTF-8 terminé par NUL, ou NULL si succès. Vide pour un échec
/// d'invocation. Valide jusqu'à `dxb_outcome_free`.
///
/// # Safety
/// `outcome` est NULL ou un handle vivant.
#[no_mangle]
pub unsafe extern "C" fn dxb_outcome_error_message(outcome: *const DxbOutcome) -> *const c_char {
    if outcome.is_null() {
        return ptr::null();
    }
    (*outcome).message.as_ref().map_or(ptr::null(), |m| m.as_ptr())
}

/// Bytecode : `*data` / `*len` (NULL / 0 si échec). Valide jusqu'à `dxb_outcome_free`.
///
/// # Safety
/// `outcome` est NULL ou un handle vivant ; `data` et `len` sont NULL ou inscriptibles.
#[no_mangle]
pub unsafe extern "C" fn dxb_outcome_bytecode(outcome: *const DxbOutcome, data: *mut *const u8, len: *mut usize) {
    let bytes: &[u8] = if outcome.is_null() { &[] } else { (*outcome).outcome.bytecode() };
    if !data.is_null() {
        *data = if bytes.is_empty() { ptr::null() } else { bytes.as_ptr() };
    }
    if !len.is_null() {
        *len = bytes.len();
    }
}

/// Libère un résultat.
///
/// # Safety
/// `outcome` est NULL ou un handle issu de `dxb_compile`, non encore libéré.
#[no_mangle]
pub unsafe extern "C" fn dxb_outcome_free(outcome: *mut DxbOutcome) {
    if !outcome.is_null() {
        guard("dxb_outcome_free", (), || drop(Box::from_raw(outcome)));
    }
}

/* ─────────────────────────── Divers ─────────────────────────── */

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Version de la bibliothèque (chaîne statique).
#[no_mangle]
pub extern "C" fn dxb_version() -> *const c_char {
    VERSION.as_ptr().cast()
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn null_handles_are_tolerated() {
        unsafe {
            dxb_loader_close(ptr::null_mut());
            dxb_compiler_release(ptr::null_mut());
            dxb_outcome_free(ptr::null_mut());

            assert!(!dxb_outcome_is_successful(ptr::null()));
            assert!(dxb_outcome_error_message(ptr::null()).is_null());

            let mut data: *const u8 = 8 as *const u8;
            let mut len = 99;
            dxb_outcome_bytecode(ptr::null(), &mut data, &mut len);
            assert!(data.is_null());
            assert_eq!(len, 0);

            assert_eq!(dxb_loader_open(ptr::null_mut()), DxbStatus::OpenLibraryError);
            let mut compiler: *mut DxbCompiler = 8 as *mut DxbCompiler;
            assert_eq!(dxb_create_compiler(ptr::null(), &mut compiler), DxbStatus::CompilerInstanceError);
            assert!(compiler.is_null());
        }
    }

    #[test]
    fn compile_on_null_compiler_is_failure() {
        unsafe {
            let outcome = dxb_compile(ptr::null_mut(), c"float4 main() : SV_Position { return 0; }".as_ptr(), None, ptr::null_mut());
            assert!(!outcome.is_null());
            assert!(!dxb_outcome_is_successful(outcome));
            assert_eq!(CStr::from_ptr(dxb_outcome_error_message(outcome)).to_bytes(), b"");
            dxb_outcome_free(outcome);
        }
    }

    #[test]
    fn failure_message_is_nul_terminated_copy() {
        let o = DxbOutcome::new(CompilationOutcome::Failure("t.hlsl:1:1: error: x\0y".into()));
        let handle = o.into_raw();
        unsafe {
            let msg = CStr::from_ptr(dxb_outcome_error_message(handle)).to_str().unwrap();
            assert_eq!(msg, "t.hlsl:1:1: error: x\u{FFFD}y");
            let mut data: *const u8 = ptr::null();
            let mut len: usize = 1;
            dxb_outcome_bytecode(handle, &mut data, &mut len);
            assert_eq!(len, 0);
            dxb_outcome_free(handle);
        }
    }

    #[test]
    fn success_exposes_bytecode_without_message() {
        let handle = DxbOutcome::new(CompilationOutcome::Success(vec![3, 2, 35, 7])).into_raw();
        unsafe {
            assert!(dxb_outcome_is_successful(handle));
            assert!(dxb_outcome_error_message(handle).is_null());
            let mut data: *const u8 = ptr::null();
            let mut len: usize = 0;
            dxb_outcome_bytecode(handle, &mut data, &mut len);
            assert_eq!(core::slice::from_raw_parts(data, len), &[3u8, 2, 35, 7]);
            dxb_outcome_free(handle);
        }
    }

    #[test]
    fn version_is_package_version() {
        let v = unsafe { CStr::from_ptr(dxb_version()) };
        assert_eq!(v.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
