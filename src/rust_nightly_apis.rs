//! Stable-Rust copies of standard library functions that are still gated
//! behind nightly features.

use std::mem::MaybeUninit;

/// Create a new array of `MaybeUninit<T>` items, in an uninitialized state.
///
/// **This is an unstable API copied from the Rust standard library, tracking
/// issue is [#96097][issue-96097]**
///
/// [issue-96097]: https://github.com/rust-lang/rust/issues/96097
pub fn maybe_uninit_uninit_array<const N: usize, T>() -> [MaybeUninit<T>; N] {
    // SAFETY: An uninitialized `[MaybeUninit<_>; N]` is valid.
    unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() }
}

/// Assuming all the elements are initialized, get a slice to them.
///
/// # Safety
///
/// It is up to the caller to guarantee that the `MaybeUninit<T>` elements
/// really are in an initialized state. Calling this when the content is not
/// yet fully initialized causes undefined behavior.
///
/// **This is an unstable API copied from the Rust standard library, tracking
/// issue is [#63569][issue-63569]**
///
/// [issue-63569]: https://github.com/rust-lang/rust/issues/63569
pub const unsafe fn maybe_uninit_slice_assume_init_ref<T>(slice: &[MaybeUninit<T>]) -> &[T] {
    // SAFETY: Casting `slice` to a `*const [T]` is safe since the caller
    // guarantees that `slice` is initialized, and `MaybeUninit` is guaranteed
    // to have the same layout as `T`. The pointer obtained is valid since it
    // refers to memory owned by `slice` which is a reference and thus
    // guaranteed to be valid for reads.
    unsafe { &*(slice as *const [MaybeUninit<T>] as *const [T]) }
}
