//! Adaptateur callback C → `IncludeHandler`.

use core::ffi::{c_char, c_void};
use std::ffi::{CStr, CString};

use dxbridge_compiler::IncludeHandler;
use log::debug;

/// `const char *(*)(const char *filename, void *user_data)`
///
/// NULL = introuvable. La chaîne rendue est copiée avant l'appel suivant.
pub type DxbIncludeFn = unsafe extern "C" fn(filename: *const c_char, user_data: *mut c_void) -> *const c_char;

/// Callback nullable tel que reçu par `dxb_compile`.
pub type DxbIncludeCallback = Option<DxbIncludeFn>;

/// Callback + contexte opaque de l'appelant, valables pendant un `dxb_compile`.
pub(crate) struct CallbackInclude {
    callback: DxbIncludeFn,
    user_data: *mut c_void,
}

impl CallbackInclude {
    pub(crate) const fn new(callback: DxbIncludeFn, user_data: *mut c_void) -> Self {
        Self { callback, user_data }
    }
}

impl IncludeHandler for CallbackInclude {
    fn load_source(&mut self, filename: &str) -> Option<String> {
        let Ok(name) = CString::new(filename) else {
            debug!("nom d'include avec NUL interne, refusé : {filename:?}");
            return None;
        };
        // SAFETY: contrat de `dxb_compile` : callback appelable avec son `user_data`
        // pendant toute la compilation ; `name` vit jusqu'au retour.
        let text = unsafe { (self.callback)(name.as_ptr(), self.user_data) };
        if text.is_null() {
            return None;
        }
        // SAFETY: chaîne terminée par NUL, valide jusqu'au prochain appel ; copiée ici.
        Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
    }
}
