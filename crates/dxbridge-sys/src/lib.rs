//! dxbridge-sys — primitives **bas-niveau** du pont DXC
//!
//! Objectifs :
//! - Modèle objet COM minimal : `Guid`, `HResult`, `IUnknown`, `ComPtr<T>`
//!   (une référence possédée, relâchée exactement une fois au `Drop`)
//! - Interfaces DXC utilisées par le pont (`IDxcCompiler3`, `IDxcUtils`,
//!   `IDxcResult`, `IDxcBlob*`, `IDxcIncludeHandler`) et leurs vtables `repr(C)`
//! - Chargement dynamique de `dxcompiler` via `libloading` et résolution de la
//!   fabrique `DxcCreateInstance2`
//!
//! Les vtables ne décrivent que ce que le pont appelle ; les autres méthodes
//! occupent un `Slot` opaque pour garder les offsets exacts.

pub mod com;
pub mod dxc;
mod loader;

pub use com::{ComPtr, Guid, HResult, IUnknown, IUnknownVtbl, Interface};
pub use loader::{DxcCreateInstance2Proc, Loader, CREATE_INSTANCE_SYMBOL};
