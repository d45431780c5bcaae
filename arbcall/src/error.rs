use crate::{ArgWidth, SLOT_COUNT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The slot position is outside `0..SLOT_COUNT`.
    SlotOutOfRange { position: usize },
    /// A script integer does not fit the declared argument width.
    ValueOutOfRange { width: ArgWidth, value: i128 },
    /// Symbol names are handed to the loader as C strings.
    InvalidName { name: String },
    /// The descriptor already has a target.
    AlreadyResolved { name: String },
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::SlotOutOfRange { position } => write!(
                f,
                "slot position {position} is out of range (0..{SLOT_COUNT})"
            ),
            CallError::ValueOutOfRange { width, value } => {
                write!(f, "value {value} does not fit into {width}")
            }
            CallError::InvalidName { name } => {
                write!(f, "symbol name {name:?} contains a NUL byte")
            }
            CallError::AlreadyResolved { name } => {
                write!(f, "call to '{name}' already has a target")
            }
        }
    }
}

impl std::error::Error for CallError {}
