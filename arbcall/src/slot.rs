use std::fmt;

/// Number of argument slots every call descriptor carries.
pub const SLOT_COUNT: usize = 10;

/// Declared width and signedness of a value written into a [`Slot`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ArgWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Ptr,
}

impl ArgWidth {
    pub const ALL: [ArgWidth; 9] = [
        ArgWidth::I8,
        ArgWidth::U8,
        ArgWidth::I16,
        ArgWidth::U16,
        ArgWidth::I32,
        ArgWidth::U32,
        ArgWidth::I64,
        ArgWidth::U64,
        ArgWidth::Ptr,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ArgWidth::I8 => "i8",
            ArgWidth::U8 => "u8",
            ArgWidth::I16 => "i16",
            ArgWidth::U16 => "u16",
            ArgWidth::I32 => "i32",
            ArgWidth::U32 => "u32",
            ArgWidth::I64 => "i64",
            ArgWidth::U64 => "u64",
            ArgWidth::Ptr => "ptr",
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ArgWidth::I8 | ArgWidth::I16 | ArgWidth::I32 | ArgWidth::I64
        )
    }

    /// Inclusive range a script integer must fall into for this width.
    pub const fn range(self) -> (i128, i128) {
        match self {
            ArgWidth::I8 => (i8::MIN as i128, i8::MAX as i128),
            ArgWidth::U8 => (0, u8::MAX as i128),
            ArgWidth::I16 => (i16::MIN as i128, i16::MAX as i128),
            ArgWidth::U16 => (0, u16::MAX as i128),
            ArgWidth::I32 => (i32::MIN as i128, i32::MAX as i128),
            ArgWidth::U32 => (0, u32::MAX as i128),
            ArgWidth::I64 => (i64::MIN as i128, i64::MAX as i128),
            ArgWidth::U64 => (0, u64::MAX as i128),
            ArgWidth::Ptr => (0, usize::MAX as i128),
        }
    }

    /// Encodes `value` as slot bits, or `None` when it does not fit.
    pub fn encode(self, value: i128) -> Option<Slot> {
        let (min, max) = self.range();
        if value < min || value > max {
            return None;
        }
        let slot = match self {
            ArgWidth::I8 => Slot::from_i8(value as i8),
            ArgWidth::U8 => Slot::from_u8(value as u8),
            ArgWidth::I16 => Slot::from_i16(value as i16),
            ArgWidth::U16 => Slot::from_u16(value as u16),
            ArgWidth::I32 => Slot::from_i32(value as i32),
            ArgWidth::U32 => Slot::from_u32(value as u32),
            ArgWidth::I64 => Slot::from_i64(value as i64),
            ArgWidth::U64 => Slot::from_u64(value as u64),
            ArgWidth::Ptr => Slot::from_address(value as usize),
        };
        Some(slot)
    }
}

impl fmt::Display for ArgWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One register-width argument container.
///
/// Every width is widened to 64 bits on write. Signed values are
/// sign-extended and unsigned values are zero-extended, so `-1i8` is
/// stored as `0xffff_ffff_ffff_ffff` and `0xffu8` as `0xff`. A callee
/// that declares a narrower parameter only looks at the low bits and sees
/// the value it was given either way.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Slot(u64);

impl Slot {
    pub const ZERO: Slot = Slot(0);

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_i8(value: i8) -> Self {
        Self(value as i64 as u64)
    }

    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_i16(value: i16) -> Self {
        Self(value as i64 as u64)
    }

    #[inline]
    pub const fn from_u16(value: u16) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_i32(value: i32) -> Self {
        Self(value as i64 as u64)
    }

    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn from_address(address: usize) -> Self {
        Self(address as u64)
    }

    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::from_address(ptr as usize)
    }
}
