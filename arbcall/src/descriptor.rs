use std::ffi::{CStr, CString};

use crate::{ArgWidth, CallError, SLOT_COUNT, Slot, Symbol, resolver};

/// One pending native call: a symbol name, its target once resolved,
/// and the argument slots.
///
/// The lifecycle is always create, fill slots, resolve, invoke. Unset
/// slots stay zero.
#[derive(Debug)]
pub struct CallDescriptor {
    name: CString,
    target: Option<Symbol>,
    slots: [Slot; SLOT_COUNT],
}

macro_rules! slot_setters {
    ($($(#[$doc:meta])* $name:ident: $ty:ty => $ctor:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                position: usize,
                value: $ty,
            ) -> Result<(), CallError> {
                self.store(position, Slot::$ctor(value))
            }
        )*
    };
}

impl CallDescriptor {
    pub fn new(name: &str) -> Result<Self, CallError> {
        let name = CString::new(name).map_err(|_| CallError::InvalidName {
            name: name.to_string(),
        })?;
        Ok(Self::from_c_name(name))
    }

    pub fn from_c_name(name: CString) -> Self {
        Self {
            name,
            target: None,
            slots: [Slot::ZERO; SLOT_COUNT],
        }
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    pub fn target(&self) -> Option<Symbol> {
        self.target
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    pub fn slots(&self) -> &[Slot; SLOT_COUNT] {
        &self.slots
    }

    pub fn slot(&self, position: usize) -> Result<Slot, CallError> {
        self.slots
            .get(position)
            .copied()
            .ok_or(CallError::SlotOutOfRange { position })
    }

    /// Overwrites the slot at `position`, whatever width wrote it before.
    pub fn store(&mut self, position: usize, slot: Slot) -> Result<(), CallError> {
        let entry = self
            .slots
            .get_mut(position)
            .ok_or(CallError::SlotOutOfRange { position })?;
        log::trace!(
            "{:?}: slot {position} = {:#018x}",
            self.name,
            slot.bits()
        );
        *entry = slot;
        Ok(())
    }

    /// Range checked write of a script integer with a declared width.
    pub fn set(
        &mut self,
        position: usize,
        width: ArgWidth,
        value: i128,
    ) -> Result<(), CallError> {
        if position >= SLOT_COUNT {
            return Err(CallError::SlotOutOfRange { position });
        }
        let slot = width
            .encode(value)
            .ok_or(CallError::ValueOutOfRange { width, value })?;
        self.store(position, slot)
    }

    slot_setters! {
        set_i8: i8 => from_i8;
        set_u8: u8 => from_u8;
        set_i16: i16 => from_i16;
        set_u16: u16 => from_u16;
        set_i32: i32 => from_i32;
        set_u32: u32 => from_u32;
        set_i64: i64 => from_i64;
        set_u64: u64 => from_u64;
        /// Passes an address, typically a buffer or a C string.
        set_ptr: *const u8 => from_ptr;
    }

    /// Looks the name up unless a target is already set.
    ///
    /// Resolving twice is a no-op that returns the first result. A miss
    /// leaves the descriptor unresolved so a later attempt looks again.
    pub fn resolve(&mut self) -> Option<Symbol> {
        if self.target.is_none() {
            self.target = resolver::resolve(&self.name);
        }
        self.target
    }

    /// Uses a known address instead of a lookup.
    pub fn bind(&mut self, symbol: Symbol) -> Result<(), CallError> {
        if self.target.is_some() {
            return Err(CallError::AlreadyResolved {
                name: self.name.to_string_lossy().into_owned(),
            });
        }
        self.target = Some(symbol);
        Ok(())
    }
}
