//! Modèle objet COM minimal.
//!
//! Un objet COM est un pointeur vers une structure dont le premier champ est un
//! pointeur de vtable ; toute vtable commence par les trois entrées
//! d'`IUnknown`. Le comptage de références est explicite (`AddRef`/`Release`) :
//! `ComPtr<T>` possède exactement une référence et la rend au `Drop`.
//!
//! La convention d'appel est `extern "system"` (stdcall sous Windows 32 bits,
//! C ailleurs).

use core::ffi::c_void;
use core::fmt;
use core::ptr::{self, NonNull};

/* ─────────────────────────── GUID ─────────────────────────── */

/// Identifiant d'interface ou de classe (`GUID`, 16 octets).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Construit un GUID depuis sa forme textuelle lue comme un entier :
    /// `73e22d93-e6ce-47f3-b5bf-f0664f39c1b0` → `0x73e22d93_e6ce_47f3_b5bf_f0664f39c1b0`.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_u128(v: u128) -> Self {
        Self {
            data1: (v >> 96) as u32,
            data2: (v >> 80) as u16,
            data3: (v >> 64) as u16,
            data4: (v as u64).to_be_bytes(),
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/* ─────────────────────────── HRESULT ─────────────────────────── */

/// Code de retour COM. Négatif = échec.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

#[allow(clippy::cast_possible_wrap)]
impl HResult {
    pub const S_OK: Self = Self(0);
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: Self = Self(0x8000_4002_u32 as i32);
    pub const E_POINTER: Self = Self(0x8000_4003_u32 as i32);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    /// `HRESULT_FROM_WIN32(ERROR_FILE_NOT_FOUND)`.
    pub const FILE_NOT_FOUND: Self = Self(0x8007_0002_u32 as i32);

    /// `SUCCEEDED(hr)`.
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// `FAILED(hr)`.
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Valeur brute non signée (`0x8000_4005`…), telle qu'affichée par les outils.
    #[allow(clippy::cast_sign_loss)]
    pub const fn code(self) -> u32 {
        self.0 as u32
    }

    /// `Ok(())` si succès, sinon l'HRESULT lui-même.
    pub const fn ok(self) -> Result<(), Self> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.code())
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

/* ─────────────────────────── IUnknown ─────────────────────────── */

/// Entrées communes à toutes les vtables COM.
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(this: *mut IUnknown, iid: *const Guid, out: *mut *mut c_void) -> HResult,
    pub add_ref: unsafe extern "system" fn(this: *mut IUnknown) -> u32,
    pub release: unsafe extern "system" fn(this: *mut IUnknown) -> u32,
}

/// Objet COM générique.
#[repr(C)]
pub struct IUnknown {
    pub vtbl: *const IUnknownVtbl,
}

/// `00000000-0000-0000-C000-000000000046`
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x0000_0000_0000_0000_c000_0000_0000_0046);

/// Interface COM décrite côté Rust.
///
/// # Safety
/// `Self` doit être `#[repr(C)]` avec pour seul champ un `*const Self::Vtbl`,
/// et `Self::Vtbl` doit commencer (récursivement) par un `IUnknownVtbl`.
pub unsafe trait Interface {
    /// Vtable de l'interface.
    type Vtbl;
    /// IID passé à `QueryInterface` / aux fabriques.
    const IID: Guid;
}

// SAFETY: `IUnknown` est la racine, vtable = `IUnknownVtbl`.
unsafe impl Interface for IUnknown {
    type Vtbl = IUnknownVtbl;
    const IID: Guid = IID_IUNKNOWN;
}

/// Déclare une interface COM : struct `repr(C)` + impl `Interface`.
macro_rules! com_interface {
    ($(#[$meta:meta])* $name:ident : $vtbl:ident = $iid:literal) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            pub vtbl: *const $vtbl,
        }

        // SAFETY: pointeur de vtable seul champ ; `$vtbl` commence par `IUnknownVtbl`.
        unsafe impl $crate::com::Interface for $name {
            type Vtbl = $vtbl;
            const IID: $crate::com::Guid = $crate::com::Guid::from_u128($iid);
        }
    };
}
pub(crate) use com_interface;

/* ─────────────────────────── ComPtr ─────────────────────────── */

/// Référence COM possédée.
///
/// - `Clone` → `AddRef`
/// - `Drop` → `Release` (exactement une fois)
/// - `into_raw` transfère la référence sans la rendre
pub struct ComPtr<T: Interface> {
    ptr: NonNull<T>,
}

impl<T: Interface> ComPtr<T> {
    /// Adopte une référence déjà comptée (pas d'`AddRef`). `None` si `raw` est nul.
    ///
    /// # Safety
    /// `raw` est nul ou pointe vers un objet COM vivant implémentant `T`, et
    /// l'appelant cède une référence.
    pub unsafe fn from_raw(raw: *mut T) -> Option<Self> {
        NonNull::new(raw).map(|ptr| Self { ptr })
    }

    /// Pointeur brut, sans transfert de propriété.
    pub const fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Cède la référence à l'appelant (aucun `Release`).
    pub fn into_raw(self) -> *mut T {
        let raw = self.ptr.as_ptr();
        core::mem::forget(self);
        raw
    }

    /// Vtable de l'objet.
    pub fn vtbl(&self) -> &T::Vtbl {
        // SAFETY: invariant d'`Interface` : premier champ = `*const T::Vtbl` valide
        // tant que l'objet vit, et `self` garde une référence.
        unsafe { &**self.ptr.as_ptr().cast::<*const T::Vtbl>() }
    }

    fn unknown(&self) -> &IUnknownVtbl {
        // SAFETY: toute vtable commence par `IUnknownVtbl`.
        unsafe { &**self.ptr.as_ptr().cast::<*const IUnknownVtbl>() }
    }

    /// `QueryInterface` vers `U`.
    pub fn query<U: Interface>(&self) -> Result<ComPtr<U>, HResult> {
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: objet vivant ; `out` reçoit une référence possédée en cas de succès.
        let hr = unsafe { (self.unknown().query_interface)(self.ptr.as_ptr().cast(), &U::IID, &mut out) };
        hr.ok()?;
        // SAFETY: succès → `out` est un `U` avec une référence pour nous.
        unsafe { ComPtr::from_raw(out.cast::<U>()) }.ok_or(HResult::E_POINTER)
    }

    /// Vue sur une interface de base (`IDxcBlobEncoding` → `IDxcBlob`…), sans comptage.
    ///
    /// # Safety
    /// `B` doit être une interface de base de `T` (vtable préfixe).
    pub const unsafe fn base_ptr<B: Interface>(&self) -> *mut B {
        self.ptr.as_ptr().cast()
    }
}

impl<T: Interface> Clone for ComPtr<T> {
    fn clone(&self) -> Self {
        // SAFETY: objet vivant, on prend une référence supplémentaire.
        unsafe { (self.unknown().add_ref)(self.ptr.as_ptr().cast()) };
        Self { ptr: self.ptr }
    }
}

impl<T: Interface> Drop for ComPtr<T> {
    fn drop(&mut self) {
        // SAFETY: on rend l'unique référence possédée par ce `ComPtr`.
        unsafe { (self.unknown().release)(self.ptr.as_ptr().cast()) };
    }
}

impl<T: Interface> fmt::Debug for ComPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComPtr").field(&self.ptr).field(&T::IID).finish()
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
