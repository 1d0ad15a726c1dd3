// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Positional application of bound argument tuples to callables.

/// A callable that can be invoked with a tuple of bound arguments, unpacked
/// positionally in their original order.
///
/// This is implemented for every [`FnOnce`] whose parameter list matches the
/// tuple, for arities 0 through 8. The arity is known at the call site; the
/// trait carries no state and introduces no failure modes of its own.
///
/// ```
/// use forkjoin::BindArgs;
///
/// fn describe(name: &str, age: u32) -> String {
///     format!("{name} is {age}")
/// }
///
/// // `describe` receives the tuple elements in original order.
/// let mut out = None;
/// (|name: &str, age: u32| out = Some(describe(name, age))).call_bound(("Ada", 36));
/// assert_eq!(out.as_deref(), Some("Ada is 36"));
/// ```
pub trait BindArgs<Args> {
    /// Invokes the callable with the given arguments.
    fn call_bound(self, args: Args);
}

macro_rules! impl_bind_args {
    () => {
        impl<F: FnOnce()> BindArgs<()> for F {
            fn call_bound(self, (): ()) {
                self()
            }
        }
    };
    ( $( $T:ident : $arg:ident ),+ ) => {
        impl<F, $($T),+> BindArgs<($($T,)+)> for F
        where
            F: FnOnce($($T),+),
        {
            fn call_bound(self, ($($arg,)+): ($($T,)+)) {
                self($($arg),+)
            }
        }
    };
}

impl_bind_args!();
impl_bind_args!(A0: a0);
impl_bind_args!(A0: a0, A1: a1);
impl_bind_args!(A0: a0, A1: a1, A2: a2);
impl_bind_args!(A0: a0, A1: a1, A2: a2, A3: a3);
impl_bind_args!(A0: a0, A1: a1, A2: a2, A3: a3, A4: a4);
impl_bind_args!(A0: a0, A1: a1, A2: a2, A3: a3, A4: a4, A5: a5);
impl_bind_args!(A0: a0, A1: a1, A2: a2, A3: a3, A4: a4, A5: a5, A6: a6);
impl_bind_args!(A0: a0, A1: a1, A2: a2, A3: a3, A4: a4, A5: a5, A6: a6, A7: a7);
