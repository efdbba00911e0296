//! Raw memory accessors for the managed side
//!
//! Addresses arrive as 64-bit integers and are trusted: the caller
//! guarantees they are valid for the access width. Nothing is checked.

use core::ffi::c_char;
use std::ffi::{CStr, CString};

macro_rules! scalar_accessors {
    ($($ty:ty => $get:ident, $set:ident;)*) => {
        $(
            /// Read a value at `address`
            ///
            /// # Safety
            /// `address` must be valid and aligned for the read
            #[no_mangle]
            pub unsafe extern "C" fn $get(address: u64) -> $ty {
                (address as usize as *const $ty).read()
            }

            /// Write `value` at `address`
            ///
            /// # Safety
            /// `address` must be valid and aligned for the write
            #[no_mangle]
            pub unsafe extern "C" fn $set(address: u64, value: $ty) {
                (address as usize as *mut $ty).write(value)
            }
        )*
    };
}

scalar_accessors! {
    i8 => mirror_bridge_get_byte, mirror_bridge_set_byte;
    i16 => mirror_bridge_get_short, mirror_bridge_set_short;
    i32 => mirror_bridge_get_int, mirror_bridge_set_int;
    i64 => mirror_bridge_get_long, mirror_bridge_set_long;
    f32 => mirror_bridge_get_float, mirror_bridge_set_float;
    f64 => mirror_bridge_get_double, mirror_bridge_set_double;
}

/// Element `index` of a pointer array
///
/// # Safety
/// `array` must point to at least `index + 1` pointers
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_get_pointer(array: u64, index: i32) -> u64 {
    let array = array as usize as *const *const u8;
    *array.offset(index as isize) as usize as u64
}

/// Store `pointer` as element `index` of a pointer array
///
/// # Safety
/// `array` must point to at least `index + 1` writable pointers
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_set_pointer(array: u64, index: i32, pointer: u64) {
    let array = array as usize as *mut *const u8;
    *array.offset(index as isize) = pointer as usize as *const u8;
}

/// Copy `length` bytes from `src` to `dest` (regions may overlap)
///
/// # Safety
/// Both ranges must be valid for `length` bytes
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_copy(dest: u64, src: u64, length: i32) {
    if length <= 0 {
        return;
    }
    core::ptr::copy(
        src as usize as *const u8,
        dest as usize as *mut u8,
        length as usize,
    );
}

/// Length of a NUL-terminated string
///
/// # Safety
/// `ptr` must point to a NUL-terminated buffer
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_strlen(ptr: u64) -> i32 {
    strlen(ptr as usize as *const c_char) as i32
}

#[cfg(unix)]
#[inline]
unsafe fn strlen(ptr: *const c_char) -> usize {
    libc::strlen(ptr)
}

#[cfg(not(unix))]
#[inline]
unsafe fn strlen(ptr: *const c_char) -> usize {
    CStr::from_ptr(ptr).to_bytes().len()
}

#[no_mangle]
pub extern "C" fn mirror_bridge_size_of_pointer() -> i32 {
    core::mem::size_of::<*const u8>() as i32
}

/// String from a NUL-terminated buffer (invalid UTF-8 is replaced)
///
/// # Safety
/// `ptr` must point to a NUL-terminated buffer
pub unsafe fn string_from_ptr(ptr: u64) -> String {
    CStr::from_ptr(ptr as usize as *const c_char)
        .to_string_lossy()
        .into_owned()
}

/// Owned UTF-8 copy of a NUL-terminated buffer; release with
/// `mirror_bridge_string_free`. Null in, null out.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_string_dup(ptr: u64) -> *mut c_char {
    if ptr == 0 {
        return core::ptr::null_mut();
    }
    // Lossy conversion never yields interior NULs
    match CString::new(string_from_ptr(ptr)) {
        Ok(copy) => copy.into_raw(),
        Err(_) => core::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` must come from `mirror_bridge_string_dup` and not be freed twice
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
