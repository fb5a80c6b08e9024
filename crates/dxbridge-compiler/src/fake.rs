//! Moteur simulé pour les tests unitaires.
//!
//! Objets COM alloués sur le tas avec comptage de références réel : chacun
//! garde un `Arc<()>` témoin, ce qui permet de vérifier qu'ils ont tous été
//! libérés (`Arc::strong_count(&token) == 1`).
//!
//! Le compilateur simulé comprend trois marqueurs dans la source :
//! - `#include "x"` : résolu via le fournisseur reçu (préfixe `./` ajouté comme DXC)
//! - `@error` : statut d'échec, diagnostic UTF-8
//! - `@error-wide` : idem, diagnostic en `wchar_t` sans page de code déclarée
//! - `@invoke-failure` : `Compile` renvoie lui-même un échec
//!
//! Succès : mot magique SPIR-V suivi du texte étendu, complété à 4 octets.

#![allow(clippy::cast_possible_truncation)]

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dxbridge_core::encoding::{to_wide, to_wide_nul, wide_to_utf8_lossy};
use dxbridge_core::{CodePage, WideChar, SPIRV_MAGIC};
use dxbridge_sys::com::{ComPtr, Guid, HResult, IUnknown, IUnknownVtbl, Interface};
use dxbridge_sys::dxc::{
    read_wide_cstr, Bool, DxcBuffer, IDxcBlob, IDxcBlobEncoding, IDxcBlobEncodingVtbl, IDxcBlobVtbl, IDxcCompiler3,
    IDxcCompiler3Vtbl, IDxcIncludeHandler, IDxcOperationResult, IDxcOperationResultVtbl, IDxcResult, IDxcResultVtbl,
    IDxcUtils, IDxcUtilsVtbl, Lpcwstr,
};

/* ─────────────────────────── Objet générique ─────────────────────────── */

#[repr(C)]
struct Fake<V: 'static, D> {
    vtbl: &'static V,
    refs: AtomicU32,
    data: D,
}

impl<V: 'static, D> Fake<V, D> {
    fn alloc<T>(vtbl: &'static V, data: D) -> *mut T {
        Box::into_raw(Box::new(Self { vtbl, refs: AtomicU32::new(1), data })).cast()
    }

    unsafe fn data<'a, T>(this: *mut T) -> &'a D {
        &(*this.cast::<Self>()).data
    }
}

unsafe extern "system" fn query_interface(_: *mut IUnknown, _: *const Guid, out: *mut *mut c_void) -> HResult {
    *out = ptr::null_mut();
    HResult::E_NOINTERFACE
}

unsafe extern "system" fn add_ref<V: 'static, D>(this: *mut IUnknown) -> u32 {
    (*this.cast::<Fake<V, D>>()).refs.fetch_add(1, Ordering::SeqCst) + 1
}

unsafe extern "system" fn release<V: 'static, D>(this: *mut IUnknown) -> u32 {
    let left = (*this.cast::<Fake<V, D>>()).refs.fetch_sub(1, Ordering::SeqCst) - 1;
    if left == 0 {
        drop(Box::from_raw(this.cast::<Fake<V, D>>()));
    }
    left
}

const fn unknown<V: 'static, D>() -> IUnknownVtbl {
    IUnknownVtbl { query_interface, add_ref: add_ref::<V, D>, release: release::<V, D> }
}

/* ─────────────────────────── Blob ─────────────────────────── */

struct BlobData {
    bytes: Vec<u8>,
    code_page: Option<u32>,
    _token: Arc<()>,
}

type FakeBlob = Fake<IDxcBlobEncodingVtbl, BlobData>;

unsafe extern "system" fn blob_pointer(this: *mut IDxcBlob) -> *mut c_void {
    FakeBlob::data(this).bytes.as_ptr().cast_mut().cast()
}

unsafe extern "system" fn blob_size(this: *mut IDxcBlob) -> usize {
    FakeBlob::data(this).bytes.len()
}

unsafe extern "system" fn blob_encoding(this: *mut IDxcBlobEncoding, known: *mut Bool, cp: *mut u32) -> HResult {
    let data = FakeBlob::data(this);
    *known = Bool::from(data.code_page.is_some());
    *cp = data.code_page.unwrap_or(0);
    HResult::S_OK
}

static BLOB_VTBL: IDxcBlobEncodingVtbl = IDxcBlobEncodingVtbl {
    base: IDxcBlobVtbl {
        base: unknown::<IDxcBlobEncodingVtbl, BlobData>(),
        get_buffer_pointer: blob_pointer,
        get_buffer_size: blob_size,
    },
    get_encoding: blob_encoding,
};

fn new_blob(bytes: Vec<u8>, code_page: Option<u32>, token: &Arc<()>) -> *mut IDxcBlobEncoding {
    FakeBlob::alloc(&BLOB_VTBL, BlobData { bytes, code_page, _token: Arc::clone(token) })
}

/// Blob texte possédé, pour tester le décodage des diagnostics.
pub fn blob(bytes: Vec<u8>, code_page: Option<CodePage>, token: &Arc<()>) -> ComPtr<IDxcBlobEncoding> {
    // SAFETY: objet neuf, référence unique cédée.
    unsafe { ComPtr::from_raw(new_blob(bytes, code_page.map(|c| c.0), token)) }.expect("blob")
}

/* ─────────────────────────── Utils ─────────────────────────── */

struct UtilsData {
    token: Arc<()>,
    fail_create: bool,
}

type FakeUtils = Fake<IDxcUtilsVtbl, UtilsData>;

unsafe extern "system" fn create_blob(
    this: *mut IDxcUtils,
    data: *const c_void,
    size: u32,
    code_page: u32,
    out: *mut *mut IDxcBlobEncoding,
) -> HResult {
    let utils = FakeUtils::data(this);
    if utils.fail_create {
        return HResult::E_FAIL;
    }
    let bytes = core::slice::from_raw_parts(data.cast::<u8>(), size as usize).to_vec();
    *out = new_blob(bytes, Some(code_page), &utils.token);
    HResult::S_OK
}

static UTILS_VTBL: IDxcUtilsVtbl = IDxcUtilsVtbl {
    base: unknown::<IDxcUtilsVtbl, UtilsData>(),
    create_blob_from_blob: None,
    create_blob_from_pinned: None,
    move_to_blob: None,
    create_blob,
    load_file: None,
    create_read_only_stream_from_blob: None,
    create_default_include_handler: None,
    get_blob_as_utf8: None,
    get_blob_as_wide: None,
    get_dxil_container_part: None,
    create_reflection: None,
    build_arguments: None,
    get_pdb_contents: None,
};

/// Utilitaires simulés ; `fail_create` fait échouer `CreateBlob`.
pub fn utils(token: &Arc<()>, fail_create: bool) -> ComPtr<IDxcUtils> {
    let raw = FakeUtils::alloc(&UTILS_VTBL, UtilsData { token: Arc::clone(token), fail_create });
    // SAFETY: objet neuf, référence unique cédée.
    unsafe { ComPtr::from_raw(raw) }.expect("utils")
}

/// Compteur de références courant d'un objet simulé.
pub fn refs<T: Interface>(ptr: &ComPtr<T>) -> u32 {
    // SAFETY: tous les objets simulés ont `refs` au même offset.
    unsafe { (*ptr.as_ptr().cast::<Fake<IUnknownVtbl, ()>>()).refs.load(Ordering::SeqCst) }
}

/* ─────────────────────────── Résultat ─────────────────────────── */

struct ResultData {
    status: HResult,
    output: Option<Vec<u8>>,
    errors: Option<(Vec<u8>, Option<u32>)>,
    token: Arc<()>,
}

type FakeResult = Fake<IDxcResultVtbl, ResultData>;

unsafe extern "system" fn get_status(this: *mut IDxcOperationResult, status: *mut HResult) -> HResult {
    *status = FakeResult::data(this).status;
    HResult::S_OK
}

unsafe extern "system" fn get_result(this: *mut IDxcOperationResult, out: *mut *mut IDxcBlob) -> HResult {
    let data = FakeResult::data(this);
    *out = data.output.as_ref().map_or(ptr::null_mut(), |b| new_blob(b.clone(), None, &data.token).cast());
    HResult::S_OK
}

unsafe extern "system" fn get_error_buffer(this: *mut IDxcOperationResult, out: *mut *mut IDxcBlobEncoding) -> HResult {
    let data = FakeResult::data(this);
    *out = data.errors.as_ref().map_or(ptr::null_mut(), |(b, cp)| new_blob(b.clone(), *cp, &data.token));
    HResult::S_OK
}

static RESULT_VTBL: IDxcResultVtbl = IDxcResultVtbl {
    base: IDxcOperationResultVtbl {
        base: unknown::<IDxcResultVtbl, ResultData>(),
        get_status,
        get_result,
        get_error_buffer,
    },
    has_output: None,
    get_output: None,
    get_num_outputs: None,
    get_output_by_index: None,
    primary_output: None,
};

/* ─────────────────────────── Compilateur ─────────────────────────── */

struct CompilerData {
    token: Arc<()>,
    arguments: Mutex<Vec<String>>,
}

type FakeCompiler = Fake<IDxcCompiler3Vtbl, CompilerData>;

fn file_not_found(name: &str) -> String {
    format!("shader.hlsl:1:10: fatal error: '{name}' file not found\n")
}

/// Remplace chaque `#include "x"` par le texte fourni par `include`.
unsafe fn expand(source: &str, include: *mut IDxcIncludeHandler) -> Result<String, String> {
    let mut out = String::new();
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix("#include") else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let name = rest.trim().trim_matches('"');
        if include.is_null() {
            return Err(file_not_found(name));
        }
        let wide = to_wide_nul(&format!("./{name}"));
        let mut blob: *mut IDxcBlob = ptr::null_mut();
        let hr = ((*(*include).vtbl).load_source)(include, wide.as_ptr(), &mut blob);
        let Some(blob) = ComPtr::from_raw(blob).filter(|_| hr.is_ok()) else {
            return Err(file_not_found(name));
        };
        out.push_str(&String::from_utf8_lossy(blob.as_bytes()));
        out.push('\n');
    }
    Ok(out)
}

unsafe extern "system" fn compile(
    this: *mut IDxcCompiler3,
    source: *const DxcBuffer,
    arguments: *const Lpcwstr,
    arg_count: u32,
    include: *mut IDxcIncludeHandler,
    riid: *const Guid,
    out: *mut *mut c_void,
) -> HResult {
    *out = ptr::null_mut();
    let compiler = FakeCompiler::data(this);
    let buffer = &*source;
    let text = String::from_utf8_lossy(core::slice::from_raw_parts(buffer.ptr.cast::<u8>(), buffer.size)).into_owned();

    let seen = (0..arg_count as usize).map(|i| wide_to_utf8_lossy(&read_wide_cstr(*arguments.add(i)))).collect();
    *compiler.arguments.lock().expect("arguments") = seen;

    if *riid != IDxcResult::IID || text.contains("@invoke-failure") {
        return HResult::E_INVALIDARG;
    }

    // DXC garde une référence sur le fournisseur pendant la compilation
    if !include.is_null() {
        ((*(*include).vtbl).base.add_ref)(include.cast());
    }
    let expanded = expand(&text, include);
    if !include.is_null() {
        ((*(*include).vtbl).base.release)(include.cast());
    }

    let token = Arc::clone(&compiler.token);
    let data = match expanded {
        Err(message) => ResultData {
            status: HResult::E_FAIL,
            output: None,
            errors: Some((message.into_bytes(), Some(CodePage::UTF8.0))),
            token,
        },
        Ok(expanded) if expanded.contains("@error-wide") => {
            let wide: Vec<WideChar> = to_wide("shader.hlsl:2:1: error: wide diagnostic\n");
            let bytes = wide.iter().flat_map(|u| u.to_ne_bytes()).collect();
            let code_page = if cfg!(windows) { None } else { Some(CodePage::UTF32.0) };
            ResultData { status: HResult::E_FAIL, output: None, errors: Some((bytes, code_page)), token }
        }
        Ok(expanded) if expanded.contains("@error") => ResultData {
            status: HResult::E_FAIL,
            output: None,
            errors: Some((b"shader.hlsl:1:1: error: unexpected token '@error'\n\0".to_vec(), Some(CodePage::UTF8.0))),
            token,
        },
        Ok(expanded) => {
            let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
            bytes.extend_from_slice(expanded.as_bytes());
            bytes.resize(bytes.len().next_multiple_of(4), 0);
            ResultData { status: HResult::S_OK, output: Some(bytes), errors: None, token }
        }
    };
    *out = FakeResult::alloc::<c_void>(&RESULT_VTBL, data);
    HResult::S_OK
}

static COMPILER_VTBL: IDxcCompiler3Vtbl = IDxcCompiler3Vtbl {
    base: unknown::<IDxcCompiler3Vtbl, CompilerData>(),
    compile,
    disassemble: None,
};

/// Compilateur simulé.
pub fn compiler(token: &Arc<()>) -> ComPtr<IDxcCompiler3> {
    let raw = FakeCompiler::alloc(&COMPILER_VTBL, CompilerData { token: Arc::clone(token), arguments: Mutex::default() });
    // SAFETY: objet neuf, référence unique cédée.
    unsafe { ComPtr::from_raw(raw) }.expect("compiler")
}

/// Arguments reçus lors du dernier `Compile`.
pub fn last_arguments(compiler: &ComPtr<IDxcCompiler3>) -> Vec<String> {
    // SAFETY: `compiler` provient de `compiler()`.
    let data = unsafe { FakeCompiler::data(compiler.as_ptr()) };
    data.arguments.lock().expect("arguments").clone()
}

/// Extrait le texte encodé après le mot magique par le compilateur simulé.
pub fn payload(bytecode: &[u8]) -> String {
    String::from_utf8_lossy(&bytecode[4..]).trim_end_matches('\0').to_owned()
}
