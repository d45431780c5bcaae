use std::ffi::CString;
use std::io::Write;

use crate::script::{ParseError, Token, tokenize};
use crate::{ArgWidth, CallDescriptor, CallError, Invocation};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferId(usize);

/// A value on the bridge stack.
///
/// Calls are owned by exactly one stack entry and move between words, so
/// a call can be invoked at most once.
#[derive(Debug)]
pub enum Value {
    Integer(i128),
    Buffer(BufferId),
    Call(Box<CallDescriptor>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Buffer(_) => "buffer",
            Value::Call(_) => "call",
        }
    }

    /// Copies integers and buffer references. Calls cannot be copied.
    fn duplicate(&self) -> Option<Value> {
        match self {
            Value::Integer(n) => Some(Value::Integer(*n)),
            Value::Buffer(id) => Some(Value::Buffer(*id)),
            Value::Call(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum BridgeError {
    Parse(ParseError),
    UnknownWord(String),
    StackUnderflow {
        word: &'static str,
        needed: usize,
        available: usize,
    },
    StackOverflow {
        limit: usize,
    },
    TypeMismatch {
        word: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    InvalidPosition {
        word: &'static str,
        position: i128,
    },
    Call {
        word: &'static str,
        error: CallError,
    },
    BufferIndex {
        word: &'static str,
        index: i128,
        size: usize,
    },
    BufferTooLarge {
        size: i128,
        max: usize,
    },
    BufferLimit {
        requested: usize,
        in_use: usize,
        limit: usize,
    },
    Io(std::io::Error),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Parse(err) => write!(f, "parse error: {err}"),
            BridgeError::UnknownWord(word) => write!(f, "unknown word '{word}'"),
            BridgeError::StackUnderflow {
                word,
                needed,
                available,
            } => write!(
                f,
                "{word}: needs {needed} values, stack has {available}"
            ),
            BridgeError::StackOverflow { limit } => {
                write!(f, "stack overflow (limit {limit})")
            }
            BridgeError::TypeMismatch {
                word,
                expected,
                got,
            } => write!(f, "{word}: expected {expected}, got {got}"),
            BridgeError::InvalidPosition { word, position } => {
                write!(f, "{word}: {position} is not a slot position")
            }
            BridgeError::Call { word, error } => write!(f, "{word}: {error}"),
            BridgeError::BufferIndex { word, index, size } => write!(
                f,
                "{word}: index {index} out of bounds for buffer of {size} bytes"
            ),
            BridgeError::BufferTooLarge { size, max } => {
                write!(f, "buffer of {size} bytes exceeds the limit of {max}")
            }
            BridgeError::BufferLimit {
                requested,
                in_use,
                limit,
            } => write!(
                f,
                "cannot allocate {requested} more bytes, {in_use} of {limit} in use"
            ),
            BridgeError::Io(err) => write!(f, "output error: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Parse(err) => Some(err),
            BridgeError::Call { error, .. } => Some(error),
            BridgeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for BridgeError {
    fn from(err: ParseError) -> Self {
        BridgeError::Parse(err)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err)
    }
}

#[derive(Debug, Clone)]
pub struct BridgeCreateInfo {
    pub stack_size: usize,
    pub max_buffer_size: usize,
    /// Bytes all buffers of one bridge may hold together.
    pub max_total_buffer_size: usize,
}

impl Default for BridgeCreateInfo {
    fn default() -> Self {
        Self {
            stack_size: 128,
            max_buffer_size: 1024 * 1024,
            max_total_buffer_size: 16 * 1024 * 1024,
        }
    }
}

/// Byte buffers handed to native code by address.
///
/// Buffers are never freed or moved while the bridge lives, so an address
/// passed to one call stays valid for later ones. Their combined size is
/// capped instead.
#[derive(Debug)]
pub struct Buffers {
    storage: Vec<Box<[u8]>>,
    in_use: usize,
    limit: usize,
}

impl Buffers {
    pub fn new(limit: usize) -> Self {
        Self {
            storage: Vec::new(),
            in_use: 0,
            limit,
        }
    }

    fn allocate(&mut self, bytes: Box<[u8]>) -> Result<BufferId, BridgeError> {
        let requested = bytes.len();
        if requested > self.limit - self.in_use {
            return Err(BridgeError::BufferLimit {
                requested,
                in_use: self.in_use,
                limit: self.limit,
            });
        }
        self.in_use += requested;
        self.storage.push(bytes);
        Ok(BufferId(self.storage.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.in_use
    }

    pub fn get(&self, id: BufferId) -> &[u8] {
        &self.storage[id.0]
    }

    fn get_mut(&mut self, id: BufferId) -> &mut [u8] {
        &mut self.storage[id.0]
    }

    fn address(&mut self, id: BufferId) -> usize {
        self.storage[id.0].as_mut_ptr() as usize
    }

    /// Text up to the first NUL, lossily decoded.
    pub fn text(&self, id: BufferId) -> String {
        let bytes = self.get(id);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }
}

pub type PrimitiveFunction = fn(&mut PrimitiveContext) -> Result<(), BridgeError>;

// `inputs` are taken from the top of the stack, deepest first
#[derive(Debug, Copy, Clone)]
pub struct PrimitiveMessage {
    pub name: &'static str,
    pub inputs: usize,
    pub outputs: usize,
    pub ptr: PrimitiveFunction,
}

impl PrimitiveMessage {
    pub const fn new(
        name: &'static str,
        inputs: usize,
        outputs: usize,
        ptr: PrimitiveFunction,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            ptr,
        }
    }
}

/// Inputs are owned by the context while a word runs. When the word fails
/// they go back onto the stack, so a word only takes an input once nothing
/// after it can fail.
pub struct PrimitiveContext<'a> {
    pub name: &'static str,
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    pub buffers: &'a mut Buffers,
    pub max_buffer_size: usize,
    pub out: &'a mut dyn Write,
}

impl PrimitiveContext<'_> {
    fn type_error(&self, expected: &'static str, got: &Value) -> BridgeError {
        BridgeError::TypeMismatch {
            word: self.name,
            expected,
            got: got.kind(),
        }
    }

    fn call_error(&self, error: CallError) -> BridgeError {
        BridgeError::Call {
            word: self.name,
            error,
        }
    }

    fn take(&mut self, index: usize) -> Value {
        std::mem::replace(&mut self.inputs[index], Value::Integer(0))
    }

    fn duplicate(&self, index: usize) -> Result<Value, BridgeError> {
        let value = &self.inputs[index];
        value
            .duplicate()
            .ok_or_else(|| self.type_error("integer or buffer", value))
    }

    fn integer(&self, index: usize) -> Result<i128, BridgeError> {
        match &self.inputs[index] {
            Value::Integer(n) => Ok(*n),
            other => Err(self.type_error("integer", other)),
        }
    }

    fn buffer(&self, index: usize) -> Result<BufferId, BridgeError> {
        match &self.inputs[index] {
            Value::Buffer(id) => Ok(*id),
            other => Err(self.type_error("buffer", other)),
        }
    }

    fn call_mut(&mut self, index: usize) -> Result<&mut CallDescriptor, BridgeError> {
        let name = self.name;
        match &mut self.inputs[index] {
            Value::Call(call) => Ok(&mut **call),
            other => Err(BridgeError::TypeMismatch {
                word: name,
                expected: "call",
                got: other.kind(),
            }),
        }
    }

    fn position(&self, index: usize) -> Result<usize, BridgeError> {
        let value = self.integer(index)?;
        usize::try_from(value).map_err(|_| BridgeError::InvalidPosition {
            word: self.name,
            position: value,
        })
    }

    fn byte_index(&self, buffer: BufferId, index: usize) -> Result<usize, BridgeError> {
        let value = self.integer(index)?;
        let size = self.buffers.get(buffer).len();
        match usize::try_from(value) {
            Ok(i) if i < size => Ok(i),
            _ => Err(BridgeError::BufferIndex {
                word: self.name,
                index: value,
                size,
            }),
        }
    }

    fn push(&mut self, value: Value) {
        self.outputs.push(value);
    }
}

/// ( x -- x x )
fn dup(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let copy = ctx.duplicate(0)?;
    let x = ctx.take(0);
    ctx.outputs.extend([x, copy]);
    Ok(())
}

/// ( x -- )
fn drop(_ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    Ok(())
}

/// ( x y -- y x )
fn swap(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let (x, y) = (ctx.take(0), ctx.take(1));
    ctx.outputs.extend([y, x]);
    Ok(())
}

/// ( x y -- x y x )
fn over(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let copy = ctx.duplicate(0)?;
    let (x, y) = (ctx.take(0), ctx.take(1));
    ctx.outputs.extend([x, y, copy]);
    Ok(())
}

/// rotates top three elements backwards
fn rot(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let (x, y, z) = (ctx.take(0), ctx.take(1), ctx.take(2));
    ctx.outputs.extend([y, z, x]);
    Ok(())
}

macro_rules! call_setters {
    ($($name:ident => $width:expr;)*) => {
        $(
            /// ( call position value -- call )
            fn $name(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
                let position = ctx.position(1)?;
                let value = ctx.integer(2)?;
                let result = ctx.call_mut(0)?.set(position, $width, value);
                result.map_err(|err| ctx.call_error(err))?;
                let call = ctx.take(0);
                ctx.push(call);
                Ok(())
            }
        )*
    };
}

call_setters! {
    call_set_i8 => ArgWidth::I8;
    call_set_u8 => ArgWidth::U8;
    call_set_i16 => ArgWidth::I16;
    call_set_u16 => ArgWidth::U16;
    call_set_i32 => ArgWidth::I32;
    call_set_u32 => ArgWidth::U32;
    call_set_i64 => ArgWidth::I64;
    call_set_u64 => ArgWidth::U64;
}

/// ( name -- call )
///
/// The name ends at the first NUL. Anything but NUL padding after it is
/// rejected rather than cut off.
fn call_new(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let buffer = ctx.buffer(0)?;
    let bytes = ctx.buffers.get(buffer);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let name = if bytes[end..].iter().all(|&b| b == 0) {
        CString::new(&bytes[..end]).ok()
    } else {
        None
    };
    let Some(name) = name else {
        let used = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let name = String::from_utf8_lossy(&bytes[..used]).into_owned();
        return Err(ctx.call_error(CallError::InvalidName { name }));
    };
    ctx.push(Value::Call(Box::new(CallDescriptor::from_c_name(name))));
    Ok(())
}

/// ( call position buffer|address -- call )
fn call_set_ptr(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let position = ctx.position(1)?;
    let address = match &ctx.inputs[2] {
        Value::Buffer(id) => ctx.buffers.address(*id) as i128,
        Value::Integer(n) => *n,
        other => return Err(ctx.type_error("buffer or address", other)),
    };
    let result = ctx.call_mut(0)?.set(position, ArgWidth::Ptr, address);
    result.map_err(|err| ctx.call_error(err))?;
    let call = ctx.take(0);
    ctx.push(call);
    Ok(())
}

/// ( call -- call )
fn call_resolve(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    ctx.call_mut(0)?.resolve();
    let call = ctx.take(0);
    ctx.push(call);
    Ok(())
}

/// ( call -- call flag )
fn call_is_resolved(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let flag = ctx.call_mut(0)?.is_resolved() as i128;
    let call = ctx.take(0);
    ctx.push(call);
    ctx.push(Value::Integer(flag));
    Ok(())
}

/// ( call -- result )
///
/// Consumes the call. Unresolved calls produce the all-ones sentinel, as
/// scripts expect.
fn call_invoke(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let call = match ctx.take(0) {
        Value::Call(call) => call,
        other => {
            let err = ctx.type_error("call", &other);
            ctx.inputs[0] = other;
            return Err(err);
        }
    };
    // SAFETY: the bridge owner vouched for the scripts it runs, see
    // `Bridge::new`
    let result = unsafe { (*call).invoke() };
    if result == Invocation::Unresolved {
        log::warn!("{}: call target unresolved, pushing sentinel", ctx.name);
    }
    ctx.push(Value::Integer(result.into_raw() as i128));
    Ok(())
}

/// ( size -- buffer )
fn buffer_new(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let size = ctx.integer(0)?;
    let max = ctx.max_buffer_size;
    let size = match usize::try_from(size) {
        Ok(n) if n <= max => n,
        _ => return Err(BridgeError::BufferTooLarge { size, max }),
    };
    let id = ctx.buffers.allocate(vec![0; size].into_boxed_slice())?;
    ctx.push(Value::Buffer(id));
    Ok(())
}

/// ( buffer -- size )
fn buffer_size(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let buffer = ctx.buffer(0)?;
    let size = ctx.buffers.get(buffer).len();
    ctx.push(Value::Integer(size as i128));
    Ok(())
}

/// ( buffer index -- byte )
fn buffer_u8_at(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let buffer = ctx.buffer(0)?;
    let index = ctx.byte_index(buffer, 1)?;
    let byte = ctx.buffers.get(buffer)[index];
    ctx.push(Value::Integer(byte as i128));
    Ok(())
}

/// ( buffer index byte -- buffer )
fn buffer_u8_at_put(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let buffer = ctx.buffer(0)?;
    let index = ctx.byte_index(buffer, 1)?;
    let value = ctx.integer(2)?;
    let byte = ArgWidth::U8
        .encode(value)
        .ok_or(CallError::ValueOutOfRange {
            width: ArgWidth::U8,
            value,
        })
        .map_err(|err| ctx.call_error(err))?
        .bits() as u8;
    ctx.buffers.get_mut(buffer)[index] = byte;
    ctx.push(Value::Buffer(buffer));
    Ok(())
}

/// ( x -- )
fn print(ctx: &mut PrimitiveContext) -> Result<(), BridgeError> {
    let text = describe(&ctx.inputs[0], ctx.buffers);
    writeln!(ctx.out, "{text}")?;
    Ok(())
}

pub fn describe(value: &Value, buffers: &Buffers) -> String {
    match value {
        Value::Integer(n) => n.to_string(),
        Value::Buffer(id) => buffers.text(*id),
        Value::Call(call) => {
            let state = if call.is_resolved() { "resolved" } else { "unresolved" };
            format!("<call {} {state}>", call.name().to_string_lossy())
        }
    }
}

pub const PRIMITIVES: &[PrimitiveMessage] = &[
    PrimitiveMessage::new("dup", 1, 2, dup),
    PrimitiveMessage::new("drop", 1, 0, drop),
    PrimitiveMessage::new("swap", 2, 2, swap),
    PrimitiveMessage::new("over", 2, 3, over),
    PrimitiveMessage::new("rot", 3, 3, rot),
    PrimitiveMessage::new("call-new", 1, 1, call_new),
    PrimitiveMessage::new("call-i8!", 3, 1, call_set_i8),
    PrimitiveMessage::new("call-u8!", 3, 1, call_set_u8),
    PrimitiveMessage::new("call-i16!", 3, 1, call_set_i16),
    PrimitiveMessage::new("call-u16!", 3, 1, call_set_u16),
    PrimitiveMessage::new("call-i32!", 3, 1, call_set_i32),
    PrimitiveMessage::new("call-u32!", 3, 1, call_set_u32),
    PrimitiveMessage::new("call-i64!", 3, 1, call_set_i64),
    PrimitiveMessage::new("call-u64!", 3, 1, call_set_u64),
    PrimitiveMessage::new("call-ptr!", 3, 1, call_set_ptr),
    PrimitiveMessage::new("call-resolve", 1, 1, call_resolve),
    PrimitiveMessage::new("call-resolved?", 1, 2, call_is_resolved),
    PrimitiveMessage::new("call-invoke", 1, 1, call_invoke),
    PrimitiveMessage::new("buffer-new", 1, 1, buffer_new),
    PrimitiveMessage::new("buffer-size", 1, 1, buffer_size),
    PrimitiveMessage::new("buffer-u8@", 2, 1, buffer_u8_at),
    PrimitiveMessage::new("buffer-u8!", 3, 1, buffer_u8_at_put),
    PrimitiveMessage::new(".", 1, 0, print),
];

pub fn find_primitive(name: &str) -> Option<&'static PrimitiveMessage> {
    PRIMITIVES.iter().find(|p| p.name == name)
}

/// Drives the call lifecycle from script text.
pub struct Bridge<W: Write> {
    stack: Vec<Value>,
    buffers: Buffers,
    info: BridgeCreateInfo,
    out: W,
}

impl<W: Write> Bridge<W> {
    /// # Safety
    ///
    /// Scripts evaluated by this bridge can call any native function in
    /// the process with arbitrary arguments. The caller vouches that every
    /// script it evaluates upholds the contract of
    /// [`CallDescriptor::invoke`].
    pub unsafe fn new(info: BridgeCreateInfo, out: W) -> Self {
        Self {
            stack: Vec::with_capacity(info.stack_size),
            buffers: Buffers::new(info.max_total_buffer_size),
            info,
            out,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Tokenizes the whole source first, then runs it token by token.
    ///
    /// A failing word leaves the stack as it was before that word.
    pub fn eval(&mut self, source: &str) -> Result<(), BridgeError> {
        let tokens = tokenize(source)?;
        for token in tokens {
            self.execute(token)?;
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), BridgeError> {
        if self.stack.len() >= self.info.stack_size {
            return Err(BridgeError::StackOverflow {
                limit: self.info.stack_size,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn execute(&mut self, token: Token) -> Result<(), BridgeError> {
        match token {
            Token::Integer(n) => self.push(Value::Integer(n)),
            Token::String(mut bytes) => {
                if self.stack.len() >= self.info.stack_size {
                    return Err(BridgeError::StackOverflow {
                        limit: self.info.stack_size,
                    });
                }
                bytes.push(0);
                if bytes.len() > self.info.max_buffer_size {
                    return Err(BridgeError::BufferTooLarge {
                        size: bytes.len() as i128,
                        max: self.info.max_buffer_size,
                    });
                }
                let id = self.buffers.allocate(bytes.into_boxed_slice())?;
                self.push(Value::Buffer(id))
            }
            Token::Word(word) => {
                let primitive = find_primitive(&word)
                    .ok_or(BridgeError::UnknownWord(word))?;
                self.send(primitive)
            }
        }
    }

    fn send(&mut self, primitive: &PrimitiveMessage) -> Result<(), BridgeError> {
        let available = self.stack.len();
        if available < primitive.inputs {
            return Err(BridgeError::StackUnderflow {
                word: primitive.name,
                needed: primitive.inputs,
                available,
            });
        }
        let base = available - primitive.inputs;
        let grown = base + primitive.outputs;
        if grown > self.info.stack_size {
            return Err(BridgeError::StackOverflow {
                limit: self.info.stack_size,
            });
        }

        log::trace!("send {}", primitive.name);
        let mut ctx = PrimitiveContext {
            name: primitive.name,
            inputs: self.stack.drain(base..).collect(),
            outputs: Vec::with_capacity(primitive.outputs),
            buffers: &mut self.buffers,
            max_buffer_size: self.info.max_buffer_size,
            out: &mut self.out,
        };
        match (primitive.ptr)(&mut ctx) {
            Ok(()) => {
                debug_assert_eq!(ctx.outputs.len(), primitive.outputs);
                self.stack.extend(ctx.outputs);
                Ok(())
            }
            Err(err) => {
                self.stack.extend(ctx.inputs);
                Err(err)
            }
        }
    }
}
