use std::ffi::c_void;

use crate::{CallDescriptor, SLOT_COUNT, Slot, Symbol};

/// Raw result reported for a call whose target could not be resolved.
///
/// A callee may legitimately return the same bits. Use [`Invocation`] to
/// tell the two apart.
pub const CALL_FAILED: u64 = u64::MAX;

/// Every target is called through this shape, whatever it declares.
type WideFn = unsafe extern "C" fn(
    u64,
    u64,
    u64,
    u64,
    u64,
    u64,
    u64,
    u64,
    u64,
    u64,
) -> u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The callee ran and returned these register bits.
    Returned(u64),
    /// No target was set, nothing was called.
    Unresolved,
}

impl Invocation {
    pub fn value(self) -> Option<u64> {
        match self {
            Invocation::Returned(value) => Some(value),
            Invocation::Unresolved => None,
        }
    }

    /// Collapses the result into a single word, using [`CALL_FAILED`] for
    /// an unresolved call.
    pub fn into_raw(self) -> u64 {
        self.value().unwrap_or(CALL_FAILED)
    }
}

impl CallDescriptor {
    /// Calls the resolved target with all ten slots as arguments.
    ///
    /// The descriptor is consumed: a descriptor is invoked at most once.
    /// The call is synchronous, has no timeout and cannot be cancelled; a
    /// callee that never returns blocks the calling thread forever.
    ///
    /// # Safety
    ///
    /// The caller asserts what the loader cannot check:
    /// - the target takes at most ten integer or pointer parameters and
    ///   returns an integer, pointer or nothing, in the C calling
    ///   convention of this platform, where surplus arguments are ignored;
    /// - every slot holds a value of the type the callee expects at that
    ///   position, and every address passed is valid for the callee's use.
    ///
    /// Anything else is undefined behaviour in native code and typically
    /// brings the process down.
    pub unsafe fn invoke(self) -> Invocation {
        let Some(target) = self.target() else {
            log::warn!("{:?} was invoked without a target", self.name());
            return Invocation::Unresolved;
        };
        log::trace!("calling {:?} at {:#x}", self.name(), target.address());
        // SAFETY: forwarded to the caller
        let result = unsafe { call_wide(target, self.slots()) };
        Invocation::Returned(result)
    }
}

unsafe fn call_wide(target: Symbol, slots: &[Slot; SLOT_COUNT]) -> u64 {
    let [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9] = (*slots).map(Slot::bits);
    // SAFETY: target is non-null code; signature compatibility is the
    // caller's contract
    let func: WideFn =
        unsafe { std::mem::transmute::<*const c_void, WideFn>(target.as_ptr()) };
    unsafe { func(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArgWidth, CallError};

    macro_rules! nth_argument {
        ($($name:ident => $index:literal),* $(,)?) => {
            $(
                #[allow(clippy::too_many_arguments)]
                extern "C" fn $name(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64,
                    a5: u64, a6: u64, a7: u64, a8: u64, a9: u64,
                ) -> u64 {
                    [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9][$index]
                }
            )*
        };
    }

    nth_argument! {
        arg0 => 0, arg1 => 1, arg2 => 2, arg3 => 3, arg4 => 4,
        arg5 => 5, arg6 => 6, arg7 => 7, arg8 => 8, arg9 => 9,
    }

    const NTH: [WideFn; SLOT_COUNT] =
        [arg0, arg1, arg2, arg3, arg4, arg5, arg6, arg7, arg8, arg9];

    extern "C" fn widen_i8(value: i8) -> i64 {
        value as i64
    }

    extern "C" fn widen_u8(value: u8) -> u64 {
        value as u64
    }

    extern "C" fn sum3(a: i32, b: i32, c: i32) -> i64 {
        a as i64 + b as i64 + c as i64
    }

    fn symbol(ptr: *const c_void) -> Symbol {
        // SAFETY: only used with the C ABI test functions above
        unsafe { Symbol::from_raw(ptr) }.unwrap()
    }

    fn bound(name: &str, ptr: *const c_void) -> CallDescriptor {
        let mut call = CallDescriptor::new(name).unwrap();
        call.bind(symbol(ptr)).unwrap();
        call
    }

    #[test]
    fn every_position_and_width_reaches_the_callee() {
        let samples: [(ArgWidth, i128, u64); 9] = [
            (ArgWidth::I8, -5, (-5i64) as u64),
            (ArgWidth::U8, 200, 200),
            (ArgWidth::I16, -300, (-300i64) as u64),
            (ArgWidth::U16, 60_000, 60_000),
            (ArgWidth::I32, i32::MIN as i128, (i32::MIN as i64) as u64),
            (ArgWidth::U32, u32::MAX as i128, u32::MAX as u64),
            (ArgWidth::I64, i64::MIN as i128, i64::MIN as u64),
            (ArgWidth::U64, u64::MAX as i128, u64::MAX),
            (ArgWidth::Ptr, 0x1000, 0x1000),
        ];
        for (position, nth) in NTH.iter().enumerate() {
            for (width, value, expected) in samples {
                let mut call = bound("nth", *nth as *const c_void);
                // fill the other slots so a wrong position shows up
                for other in 0..SLOT_COUNT {
                    call.set_u64(other, 0xdead_0000 + other as u64).unwrap();
                }
                call.set(position, width, value).unwrap();
                // SAFETY: nth takes ten u64 arguments
                let result = unsafe { call.invoke() };
                assert_eq!(
                    result,
                    Invocation::Returned(expected),
                    "{width} at slot {position}"
                );
            }
        }
    }

    #[test]
    fn unset_slots_are_zero() {
        let call = bound("arg9", arg9 as *const c_void);
        // SAFETY: arg9 takes ten u64 arguments
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(0));
    }

    #[test]
    fn unresolved_call_is_not_invoked() {
        let mut call = CallDescriptor::new("arbcall_no_such_function").unwrap();
        call.set_i32(0, 42).unwrap();
        call.set_ptr(1, c"x".as_ptr().cast()).unwrap();
        assert_eq!(call.resolve(), None);
        // SAFETY: nothing is called without a target
        let result = unsafe { call.invoke() };
        assert_eq!(result, Invocation::Unresolved);
        assert_eq!(result.value(), None);
        assert_eq!(result.into_raw(), CALL_FAILED);
    }

    #[test]
    fn last_write_wins_at_the_call_boundary() {
        let mut call = bound("arg2", arg2 as *const c_void);
        call.set_i64(2, -1).unwrap();
        call.set_u16(2, 9).unwrap();
        // SAFETY: arg2 takes ten u64 arguments
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(9));
    }

    // Narrow signed values are sign-extended into the slot, so a callee
    // that reads the full register sees all ones and one that declares
    // `i8` sees -1.
    #[test]
    fn negative_i8_is_sign_extended() {
        let mut call = bound("arg0", arg0 as *const c_void);
        call.set_i8(0, -1).unwrap();
        // SAFETY: arg0 takes ten u64 arguments
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(u64::MAX));

        let mut call = bound("widen_i8", widen_i8 as *const c_void);
        call.set_i8(0, -1).unwrap();
        // SAFETY: widen_i8 takes one integer argument, the rest are ignored
        let result = unsafe { call.invoke() };
        assert_eq!(result.value().map(|v| v as i64), Some(-1));
    }

    #[test]
    fn unsigned_i8_is_zero_extended() {
        let mut call = bound("widen_u8", widen_u8 as *const c_void);
        call.set_u8(0, 0xff).unwrap();
        // SAFETY: widen_u8 takes one integer argument
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(0xff));
    }

    #[test]
    fn fewer_declared_parameters_ignore_the_rest() {
        let mut call = bound("sum3", sum3 as *const c_void);
        call.set_i32(0, 40).unwrap();
        call.set_i32(1, -2).unwrap();
        call.set_i32(2, 4).unwrap();
        call.set_u64(7, u64::MAX).unwrap();
        // SAFETY: sum3 takes three i32 arguments
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(42));
    }

    #[test]
    fn invalid_position_fails_before_invoking() {
        let mut call = bound("arg0", arg0 as *const c_void);
        assert_eq!(
            call.set_u8(SLOT_COUNT, 1),
            Err(CallError::SlotOutOfRange {
                position: SLOT_COUNT
            })
        );
        // SAFETY: arg0 takes ten u64 arguments
        assert_eq!(unsafe { call.invoke() }, Invocation::Returned(0));
    }

    #[cfg(unix)]
    mod native {
        use super::*;

        #[test]
        fn strlen_counts_a_known_buffer() {
            let buffer = *b"hello\0";
            let mut call = CallDescriptor::new("strlen").unwrap();
            call.set_ptr(0, buffer.as_ptr()).unwrap();
            assert!(call.resolve().is_some());
            // SAFETY: strlen(const char *) with a NUL terminated buffer
            assert_eq!(unsafe { call.invoke() }, Invocation::Returned(5));
        }

        #[test]
        fn labs_sees_a_sign_extended_i32() {
            let mut call = CallDescriptor::new("labs").unwrap();
            call.set_i32(0, -7).unwrap();
            call.resolve();
            // SAFETY: labs(long)
            assert_eq!(unsafe { call.invoke() }, Invocation::Returned(7));
        }

        #[test]
        fn descriptors_for_the_same_name_are_independent() {
            let short = *b"abc\0";
            let long = *b"abcdefghij\0";

            let mut first = CallDescriptor::new("strlen").unwrap();
            let mut second = CallDescriptor::new("strlen").unwrap();
            first.set_ptr(0, short.as_ptr()).unwrap();
            second.set_ptr(0, long.as_ptr()).unwrap();
            first.resolve();
            second.resolve();

            // SAFETY: strlen with NUL terminated buffers
            let (a, b) = unsafe { (first.invoke(), second.invoke()) };
            assert_eq!(a, Invocation::Returned(3));
            assert_eq!(b, Invocation::Returned(10));
        }

        #[test]
        fn descriptors_on_separate_threads() {
            let words: Vec<String> =
                (1..=8).map(|n| "x".repeat(n * 3)).collect();
            std::thread::scope(|scope| {
                let handles: Vec<_> = words
                    .iter()
                    .map(|word| {
                        scope.spawn(move || {
                            let text = std::ffi::CString::new(word.as_str()).unwrap();
                            let mut call = CallDescriptor::new("strlen").unwrap();
                            call.set_ptr(0, text.as_ptr().cast()).unwrap();
                            call.resolve();
                            // SAFETY: strlen with a C string
                            unsafe { call.invoke() }
                        })
                    })
                    .collect();
                for (word, handle) in words.iter().zip(handles) {
                    let result = handle.join().unwrap();
                    assert_eq!(result, Invocation::Returned(word.len() as u64));
                }
            });
        }
    }
}
