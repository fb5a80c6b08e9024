//! Interfaces DXC et appels typés.
//!
//! Seules les méthodes appelées par le pont sont typées ; les autres entrées
//! de vtable sont des `Slot` (pointeur de fonction nullable, même taille) pour
//! conserver les offsets de `dxcapi.h`.
//!
//! Hors Windows, l'`IUnknown` de DXC n'a pas de destructeur virtuel (DXC ≥ 1.7) :
//! les vtables ci-dessous commencent directement par `QueryInterface`.

use core::ffi::c_void;
use core::ptr;

use dxbridge_core::encoding::{decode_blob_text, to_wide_nul};
use dxbridge_core::{CodePage, WideChar};

use crate::com::{com_interface, ComPtr, Guid, HResult, IUnknownVtbl, Interface};

/// `LPCWSTR`
pub type Lpcwstr = *const WideChar;
/// `BOOL` Win32.
pub type Bool = i32;
/// Entrée de vtable non utilisée par le pont.
pub type Slot = Option<unsafe extern "system" fn()>;

/* ─────────────────────────── CLSID ─────────────────────────── */

/// `CLSID_DxcCompiler`
pub const CLSID_DXC_COMPILER: Guid = Guid::from_u128(0x73e2_2d93_e6ce_47f3_b5bf_f066_4f39_c1b0);
/// `CLSID_DxcUtils` (alias historique `CLSID_DxcLibrary`)
pub const CLSID_DXC_UTILS: Guid = Guid::from_u128(0x6245_d6af_66e0_48fd_80b4_4d27_1796_748c);

/* ─────────────────────────── Types ─────────────────────────── */

/// Source passée à `IDxcCompiler3::Compile`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DxcBuffer {
    pub ptr: *const c_void,
    pub size: usize,
    /// Page de code (`0` = détection par le moteur).
    pub encoding: u32,
}

/* ─────────────────────────── Interfaces ─────────────────────────── */

com_interface! {
    /// Buffer opaque (bytecode, texte…).
    IDxcBlob: IDxcBlobVtbl = 0x8ba5_fb08_5195_40e2_ac58_0d98_9c3a_0102
}

#[repr(C)]
pub struct IDxcBlobVtbl {
    pub base: IUnknownVtbl,
    pub get_buffer_pointer: unsafe extern "system" fn(this: *mut IDxcBlob) -> *mut c_void,
    pub get_buffer_size: unsafe extern "system" fn(this: *mut IDxcBlob) -> usize,
}

com_interface! {
    /// Blob texte avec page de code éventuellement connue.
    IDxcBlobEncoding: IDxcBlobEncodingVtbl = 0x7241_d424_2646_4191_97c0_98e9_6e42_fc68
}

#[repr(C)]
pub struct IDxcBlobEncodingVtbl {
    pub base: IDxcBlobVtbl,
    pub get_encoding:
        unsafe extern "system" fn(this: *mut IDxcBlobEncoding, known: *mut Bool, code_page: *mut u32) -> HResult,
}

com_interface! {
    /// Résultat d'une opération (statut, sortie, diagnostics).
    IDxcOperationResult: IDxcOperationResultVtbl = 0xcedb_484a_d4e9_445a_b991_ca21_ca15_7dc2
}

#[repr(C)]
pub struct IDxcOperationResultVtbl {
    pub base: IUnknownVtbl,
    pub get_status: unsafe extern "system" fn(this: *mut IDxcOperationResult, status: *mut HResult) -> HResult,
    pub get_result: unsafe extern "system" fn(this: *mut IDxcOperationResult, result: *mut *mut IDxcBlob) -> HResult,
    pub get_error_buffer:
        unsafe extern "system" fn(this: *mut IDxcOperationResult, errors: *mut *mut IDxcBlobEncoding) -> HResult,
}

com_interface! {
    /// Résultat de `IDxcCompiler3::Compile`.
    IDxcResult: IDxcResultVtbl = 0x5834_6cda_dde7_4497_9461_6f87_af5e_0659
}

#[repr(C)]
pub struct IDxcResultVtbl {
    pub base: IDxcOperationResultVtbl,
    pub has_output: Slot,
    pub get_output: Slot,
    pub get_num_outputs: Slot,
    pub get_output_by_index: Slot,
    pub primary_output: Slot,
}

com_interface! {
    /// Fournisseur de sources incluses, implémenté côté appelant.
    IDxcIncludeHandler: IDxcIncludeHandlerVtbl = 0x7f61_fc7d_950d_467f_b3e3_3c02_fb49_187c
}

#[repr(C)]
pub struct IDxcIncludeHandlerVtbl {
    pub base: IUnknownVtbl,
    pub load_source: unsafe extern "system" fn(
        this: *mut IDxcIncludeHandler,
        filename: Lpcwstr,
        include_source: *mut *mut IDxcBlob,
    ) -> HResult,
}

com_interface! {
    /// Compilateur HLSL (API moderne).
    IDxcCompiler3: IDxcCompiler3Vtbl = 0x228b_4687_5a6a_4730_900c_9702_b220_3f54
}

#[repr(C)]
pub struct IDxcCompiler3Vtbl {
    pub base: IUnknownVtbl,
    pub compile: unsafe extern "system" fn(
        this: *mut IDxcCompiler3,
        source: *const DxcBuffer,
        arguments: *const Lpcwstr,
        arg_count: u32,
        include_handler: *mut IDxcIncludeHandler,
        riid: *const Guid,
        result: *mut *mut c_void,
    ) -> HResult,
    pub disassemble: Slot,
}

com_interface! {
    /// Utilitaires (création de blobs…).
    IDxcUtils: IDxcUtilsVtbl = 0x4605_c4cb_2019_492a_ada4_65f2_0bb7_d67f
}

#[repr(C)]
pub struct IDxcUtilsVtbl {
    pub base: IUnknownVtbl,
    pub create_blob_from_blob: Slot,
    pub create_blob_from_pinned: Slot,
    pub move_to_blob: Slot,
    pub create_blob: unsafe extern "system" fn(
        this: *mut IDxcUtils,
        data: *const c_void,
        size: u32,
        code_page: u32,
        blob: *mut *mut IDxcBlobEncoding,
    ) -> HResult,
    pub load_file: Slot,
    pub create_read_only_stream_from_blob: Slot,
    pub create_default_include_handler: Slot,
    pub get_blob_as_utf8: Slot,
    pub get_blob_as_wide: Slot,
    pub get_dxil_container_part: Slot,
    pub create_reflection: Slot,
    pub build_arguments: Slot,
    pub get_pdb_contents: Slot,
}

/* ─────────────────────────── Appels typés ─────────────────────────── */

/// Octets d'un blob ; vue valide tant que le blob vit.
///
/// # Safety
/// `blob` pointe vers un `IDxcBlob` vivant pour `'a`.
unsafe fn blob_bytes<'a>(blob: *mut IDxcBlob) -> &'a [u8] {
    let vtbl = &*(*blob).vtbl;
    let data = (vtbl.get_buffer_pointer)(blob);
    let len = (vtbl.get_buffer_size)(blob);
    if data.is_null() || len == 0 {
        &[]
    } else {
        core::slice::from_raw_parts(data.cast::<u8>(), len)
    }
}

impl ComPtr<IDxcBlob> {
    /// Contenu du blob.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `self` garde l'objet vivant pendant l'emprunt.
        unsafe { blob_bytes(self.as_ptr()) }
    }
}

impl ComPtr<IDxcBlobEncoding> {
    /// Contenu brut du blob.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `IDxcBlob` est la base d'`IDxcBlobEncoding`.
        unsafe { blob_bytes(self.base_ptr::<IDxcBlob>()) }
    }

    /// Page de code déclarée (`None` si inconnue).
    pub fn encoding(&self) -> Result<Option<CodePage>, HResult> {
        let mut known: Bool = 0;
        let mut code_page: u32 = 0;
        // SAFETY: objet vivant, pointeurs de sortie locaux.
        let hr = unsafe { (self.vtbl().get_encoding)(self.as_ptr(), &mut known, &mut code_page) };
        hr.ok()?;
        Ok((known != 0).then_some(CodePage(code_page)))
    }

    /// Texte UTF-8 du blob, selon sa page de code.
    pub fn to_utf8(&self) -> Result<String, HResult> {
        let code_page = self.encoding()?;
        Ok(decode_blob_text(self.as_bytes(), code_page))
    }
}

impl ComPtr<IDxcResult> {
    fn operation(&self) -> (&IDxcOperationResultVtbl, *mut IDxcOperationResult) {
        // SAFETY: `IDxcOperationResult` est la base d'`IDxcResult`.
        (&self.vtbl().base, unsafe { self.base_ptr::<IDxcOperationResult>() })
    }

    /// Statut de la compilation (l'HRESULT interne, pas celui de l'appel).
    pub fn status(&self) -> Result<HResult, HResult> {
        let (vtbl, this) = self.operation();
        let mut status = HResult::E_FAIL;
        // SAFETY: objet vivant, sortie locale.
        unsafe { (vtbl.get_status)(this, &mut status) }.ok()?;
        Ok(status)
    }

    /// Sortie principale (bytecode).
    pub fn result_blob(&self) -> Result<ComPtr<IDxcBlob>, HResult> {
        let (vtbl, this) = self.operation();
        let mut out: *mut IDxcBlob = ptr::null_mut();
        // SAFETY: objet vivant ; `out` reçoit une référence possédée.
        unsafe { (vtbl.get_result)(this, &mut out) }.ok()?;
        // SAFETY: référence cédée par `GetResult`.
        unsafe { ComPtr::from_raw(out) }.ok_or(HResult::E_POINTER)
    }

    /// Diagnostics produits par la compilation.
    pub fn error_buffer(&self) -> Result<ComPtr<IDxcBlobEncoding>, HResult> {
        let (vtbl, this) = self.operation();
        let mut out: *mut IDxcBlobEncoding = ptr::null_mut();
        // SAFETY: objet vivant ; `out` reçoit une référence possédée.
        unsafe { (vtbl.get_error_buffer)(this, &mut out) }.ok()?;
        // SAFETY: référence cédée par `GetErrorBuffer`.
        unsafe { ComPtr::from_raw(out) }.ok_or(HResult::E_POINTER)
    }
}

impl ComPtr<IDxcUtils> {
    /// Copie `text` dans un blob déclaré UTF-8.
    pub fn create_blob_utf8(&self, text: &str) -> Result<ComPtr<IDxcBlobEncoding>, HResult> {
        let size = u32::try_from(text.len()).map_err(|_| HResult::E_INVALIDARG)?;
        let mut out: *mut IDxcBlobEncoding = ptr::null_mut();
        // SAFETY: `CreateBlob` copie les octets ; `out` reçoit une référence possédée.
        let hr = unsafe { (self.vtbl().create_blob)(self.as_ptr(), text.as_ptr().cast(), size, CodePage::UTF8.0, &mut out) };
        hr.ok()?;
        // SAFETY: référence cédée par `CreateBlob`.
        unsafe { ComPtr::from_raw(out) }.ok_or(HResult::E_POINTER)
    }
}

impl ComPtr<IDxcCompiler3> {
    /// Compile `source` (UTF-8) avec `arguments`.
    ///
    /// `Err` = l'appel lui-même a échoué ; une compilation en erreur renvoie
    /// `Ok` avec un statut d'échec dans le résultat.
    ///
    /// # Safety
    /// `include_handler` est nul ou un `IDxcIncludeHandler` vivant pendant l'appel.
    pub unsafe fn compile(
        &self,
        source: &[u8],
        arguments: &[&str],
        include_handler: *mut IDxcIncludeHandler,
    ) -> Result<ComPtr<IDxcResult>, HResult> {
        let wide: Vec<Vec<WideChar>> = arguments.iter().map(|a| to_wide_nul(a)).collect();
        let argv: Vec<Lpcwstr> = wide.iter().map(|a| a.as_ptr()).collect();
        let argc = u32::try_from(argv.len()).map_err(|_| HResult::E_INVALIDARG)?;
        let buffer = DxcBuffer { ptr: source.as_ptr().cast(), size: source.len(), encoding: CodePage::UTF8.0 };

        let mut out: *mut c_void = ptr::null_mut();
        let hr = (self.vtbl().compile)(
            self.as_ptr(),
            &buffer,
            argv.as_ptr(),
            argc,
            include_handler,
            &IDxcResult::IID,
            &mut out,
        );
        // adopté avant le test d'erreur : relâché même si `hr` échoue
        let result = ComPtr::from_raw(out.cast::<IDxcResult>());
        hr.ok()?;
        result.ok_or(HResult::E_POINTER)
    }
}

/// Lit une chaîne `wchar_t` terminée par NUL.
///
/// # Safety
/// `text` est nul ou pointe vers une chaîne terminée par un `0`.
pub unsafe fn read_wide_cstr(text: Lpcwstr) -> Vec<WideChar> {
    if text.is_null() {
        return Vec::new();
    }
    let mut len = 0;
    while *text.add(len) != 0 {
        len += 1;
    }
    core::slice::from_raw_parts(text, len).to_vec()
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};
    use pretty_assertions::assert_eq;

    const PTR: usize = size_of::<*const c_void>();

    #[test]
    fn vtable_offsets_match_dxcapi() {
        assert_eq!(size_of::<IUnknownVtbl>(), 3 * PTR);
        assert_eq!(offset_of!(IDxcBlobVtbl, get_buffer_size), 4 * PTR);
        assert_eq!(offset_of!(IDxcBlobEncodingVtbl, get_encoding), 5 * PTR);
        assert_eq!(offset_of!(IDxcOperationResultVtbl, get_error_buffer), 5 * PTR);
        assert_eq!(size_of::<IDxcResultVtbl>(), 11 * PTR);
        assert_eq!(offset_of!(IDxcCompiler3Vtbl, compile), 3 * PTR);
        assert_eq!(offset_of!(IDxcUtilsVtbl, create_blob), 6 * PTR);
        assert_eq!(size_of::<IDxcUtilsVtbl>(), 16 * PTR);
        assert_eq!(offset_of!(IDxcIncludeHandlerVtbl, load_source), 3 * PTR);
        assert_eq!(size_of::<Slot>(), PTR);
    }

    #[test]
    fn interface_ids() {
        assert_eq!(IDxcCompiler3::IID.to_string(), "228b4687-5a6a-4730-900c-9702b2203f54");
        assert_eq!(IDxcUtils::IID.to_string(), "4605c4cb-2019-492a-ada4-65f20bb7d67f");
        assert_eq!(IDxcIncludeHandler::IID.to_string(), "7f61fc7d-950d-467f-b3e3-3c02fb49187c");
        assert_eq!(CLSID_DXC_COMPILER.to_string(), "73e22d93-e6ce-47f3-b5bf-f0664f39c1b0");
    }

    #[test]
    fn dxc_buffer_layout() {
        assert_eq!(offset_of!(DxcBuffer, size), PTR);
        assert_eq!(offset_of!(DxcBuffer, encoding), 2 * PTR);
    }

    #[test]
    fn wide_cstr_reading() {
        let wide = to_wide_nul("./common.hlsl");
        let read = unsafe { read_wide_cstr(wide.as_ptr()) };
        assert_eq!(read.len(), wide.len() - 1);
        assert_eq!(dxbridge_core::encoding::wide_to_utf8(&read).unwrap(), "./common.hlsl");
        assert!(unsafe { read_wide_cstr(ptr::null()) }.is_empty());
    }
}
