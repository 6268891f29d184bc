//! Opcode set and the per-opcode operand interpretation table.
//!
//! Every statement is one 16-bit opcode plus three 16-bit operands. What
//! an operand means is fixed per opcode: most denote a global-data slot
//! of some kind, jump instructions carry a signed statement offset
//! ("direct"), and unused positions are ignored. The loader drives its
//! operand bounds checks off this table, and the trace formatter drives
//! its annotations off it, so the table must stay in sync with the
//! interpreter.

use serde::Serialize;

/// Instruction opcodes, one per wire value `0x00..=0x41`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum Opcode {
    Done = 0x00,

    MulF = 0x01,  // c = a * b
    MulV = 0x02,  // c = dot(a, b)
    MulFv = 0x03, // c = a * b, scalar a
    MulVf = 0x04, // c = a * b, scalar b
    DivF = 0x05,
    AddF = 0x06,
    AddV = 0x07,
    SubF = 0x08,
    SubV = 0x09,

    EqF = 0x0a,
    EqV = 0x0b,
    EqS = 0x0c,
    EqE = 0x0d,
    EqFnc = 0x0e,

    NeF = 0x0f,
    NeV = 0x10,
    NeS = 0x11,
    NeE = 0x12,
    NeFnc = 0x13,

    Le = 0x14,
    Ge = 0x15,
    Lt = 0x16,
    Gt = 0x17,

    LoadF = 0x18,   // c = entity(a).field(b)
    LoadV = 0x19,
    LoadS = 0x1a,
    LoadEnt = 0x1b,
    LoadFld = 0x1c,
    LoadFnc = 0x1d,

    Address = 0x1e, // c = address of entity(a).field(b)

    StoreF = 0x1f,  // b = a
    StoreV = 0x20,
    StoreS = 0x21,
    StoreEnt = 0x22,
    StoreFld = 0x23,
    StoreFnc = 0x24,

    StorepF = 0x25, // *b = a, b holds an entity address
    StorepV = 0x26,
    StorepS = 0x27,
    StorepEnt = 0x28,
    StorepFld = 0x29,
    StorepFnc = 0x2a,

    Return = 0x2b,

    NotF = 0x2c,
    NotV = 0x2d,
    NotS = 0x2e,
    NotEnt = 0x2f,
    NotFnc = 0x30,

    If = 0x31,    // if a: jump by b
    IfNot = 0x32, // if !a: jump by b

    Call0 = 0x33,
    Call1 = 0x34,
    Call2 = 0x35,
    Call3 = 0x36,
    Call4 = 0x37,
    Call5 = 0x38,
    Call6 = 0x39,
    Call7 = 0x3a,
    Call8 = 0x3b,

    State = 0x3c,

    Goto = 0x3d, // jump by a

    And = 0x3e,
    Or = 0x3f,

    BitAnd = 0x40,
    BitOr = 0x41,
}

/// Lowest and highest valid wire values.
pub const OPCODE_MIN: u16 = 0x00;
pub const OPCODE_MAX: u16 = 0x41;

const OPCODES: [Opcode; 0x42] = [
    Opcode::Done,
    Opcode::MulF,
    Opcode::MulV,
    Opcode::MulFv,
    Opcode::MulVf,
    Opcode::DivF,
    Opcode::AddF,
    Opcode::AddV,
    Opcode::SubF,
    Opcode::SubV,
    Opcode::EqF,
    Opcode::EqV,
    Opcode::EqS,
    Opcode::EqE,
    Opcode::EqFnc,
    Opcode::NeF,
    Opcode::NeV,
    Opcode::NeS,
    Opcode::NeE,
    Opcode::NeFnc,
    Opcode::Le,
    Opcode::Ge,
    Opcode::Lt,
    Opcode::Gt,
    Opcode::LoadF,
    Opcode::LoadV,
    Opcode::LoadS,
    Opcode::LoadEnt,
    Opcode::LoadFld,
    Opcode::LoadFnc,
    Opcode::Address,
    Opcode::StoreF,
    Opcode::StoreV,
    Opcode::StoreS,
    Opcode::StoreEnt,
    Opcode::StoreFld,
    Opcode::StoreFnc,
    Opcode::StorepF,
    Opcode::StorepV,
    Opcode::StorepS,
    Opcode::StorepEnt,
    Opcode::StorepFld,
    Opcode::StorepFnc,
    Opcode::Return,
    Opcode::NotF,
    Opcode::NotV,
    Opcode::NotS,
    Opcode::NotEnt,
    Opcode::NotFnc,
    Opcode::If,
    Opcode::IfNot,
    Opcode::Call0,
    Opcode::Call1,
    Opcode::Call2,
    Opcode::Call3,
    Opcode::Call4,
    Opcode::Call5,
    Opcode::Call6,
    Opcode::Call7,
    Opcode::Call8,
    Opcode::State,
    Opcode::Goto,
    Opcode::And,
    Opcode::Or,
    Opcode::BitAnd,
    Opcode::BitOr,
];

/// What one operand position means for a given opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperandKind {
    /// Operand unused.
    None,
    /// Literal value: a signed relative jump offset.
    Direct,
    /// Global slot holding a float.
    Float,
    /// Global slot holding a three-cell vector.
    Vector,
    /// Global slot holding a string handle.
    String,
    /// Global slot holding an entity number.
    Entity,
    /// Global slot holding a field offset.
    Field,
    /// Global slot holding a function index.
    Function,
    /// Global slot holding an entity-memory address.
    Address,
}

impl OperandKind {
    /// Cells the operand's slot must span in global data. `None` for
    /// operands that do not reference global data at all.
    pub fn slot_width(self) -> Option<usize> {
        match self {
            OperandKind::None | OperandKind::Direct => None,
            OperandKind::Vector => Some(3),
            _ => Some(1),
        }
    }
}

impl Opcode {
    pub fn from_u16(raw: u16) -> Option<Opcode> {
        OPCODES.get(raw as usize).copied()
    }

    /// Wire name, as emitted in dumps and traces.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Done => "DONE",
            MulF => "MUL_F",
            MulV => "MUL_V",
            MulFv => "MUL_FV",
            MulVf => "MUL_VF",
            DivF => "DIV_F",
            AddF => "ADD_F",
            AddV => "ADD_V",
            SubF => "SUB_F",
            SubV => "SUB_V",
            EqF => "EQ_F",
            EqV => "EQ_V",
            EqS => "EQ_S",
            EqE => "EQ_E",
            EqFnc => "EQ_FNC",
            NeF => "NE_F",
            NeV => "NE_V",
            NeS => "NE_S",
            NeE => "NE_E",
            NeFnc => "NE_FNC",
            Le => "LE",
            Ge => "GE",
            Lt => "LT",
            Gt => "GT",
            LoadF => "LOAD_F",
            LoadV => "LOAD_V",
            LoadS => "LOAD_S",
            LoadEnt => "LOAD_ENT",
            LoadFld => "LOAD_FLD",
            LoadFnc => "LOAD_FNC",
            Address => "ADDRESS",
            StoreF => "STORE_F",
            StoreV => "STORE_V",
            StoreS => "STORE_S",
            StoreEnt => "STORE_ENT",
            StoreFld => "STORE_FLD",
            StoreFnc => "STORE_FNC",
            StorepF => "STOREP_F",
            StorepV => "STOREP_V",
            StorepS => "STOREP_S",
            StorepEnt => "STOREP_ENT",
            StorepFld => "STOREP_FLD",
            StorepFnc => "STOREP_FNC",
            Return => "RETURN",
            NotF => "NOT_F",
            NotV => "NOT_V",
            NotS => "NOT_S",
            NotEnt => "NOT_ENT",
            NotFnc => "NOT_FNC",
            If => "IF",
            IfNot => "IFNOT",
            Call0 => "CALL0",
            Call1 => "CALL1",
            Call2 => "CALL2",
            Call3 => "CALL3",
            Call4 => "CALL4",
            Call5 => "CALL5",
            Call6 => "CALL6",
            Call7 => "CALL7",
            Call8 => "CALL8",
            State => "STATE",
            Goto => "GOTO",
            And => "AND",
            Or => "OR",
            BitAnd => "BITAND",
            BitOr => "BITOR",
        }
    }

    /// The fixed operand interpretation for this opcode.
    pub fn operands(self) -> [OperandKind; 3] {
        use Opcode::*;
        use OperandKind as K;
        match self {
            Done | Return => [K::Vector, K::None, K::None],

            MulF | DivF | AddF | SubF => [K::Float, K::Float, K::Float],
            MulV => [K::Vector, K::Vector, K::Float],
            MulFv => [K::Float, K::Vector, K::Vector],
            MulVf => [K::Vector, K::Float, K::Vector],
            AddV | SubV => [K::Vector, K::Vector, K::Vector],

            EqF | NeF => [K::Float, K::Float, K::Float],
            EqV | NeV => [K::Vector, K::Vector, K::Float],
            EqS | NeS => [K::String, K::String, K::Float],
            EqE | NeE => [K::Entity, K::Entity, K::Float],
            EqFnc | NeFnc => [K::Function, K::Function, K::Float],

            Le | Ge | Lt | Gt => [K::Float, K::Float, K::Float],

            LoadF => [K::Entity, K::Field, K::Float],
            LoadV => [K::Entity, K::Field, K::Vector],
            LoadS => [K::Entity, K::Field, K::String],
            LoadEnt => [K::Entity, K::Field, K::Entity],
            LoadFld => [K::Entity, K::Field, K::Field],
            LoadFnc => [K::Entity, K::Field, K::Function],

            Address => [K::Entity, K::Field, K::Address],

            StoreF => [K::Float, K::Float, K::None],
            StoreV => [K::Vector, K::Vector, K::None],
            StoreS => [K::String, K::String, K::None],
            StoreEnt => [K::Entity, K::Entity, K::None],
            StoreFld => [K::Field, K::Field, K::None],
            StoreFnc => [K::Function, K::Function, K::None],

            StorepF => [K::Float, K::Address, K::None],
            StorepV => [K::Vector, K::Address, K::None],
            StorepS => [K::String, K::Address, K::None],
            StorepEnt => [K::Entity, K::Address, K::None],
            StorepFld => [K::Field, K::Address, K::None],
            StorepFnc => [K::Function, K::Address, K::None],

            NotF => [K::Float, K::None, K::Float],
            NotV => [K::Vector, K::None, K::Float],
            NotS => [K::String, K::None, K::Float],
            NotEnt => [K::Entity, K::None, K::Float],
            NotFnc => [K::Function, K::None, K::Float],

            If | IfNot => [K::Float, K::Direct, K::None],

            Call0 | Call1 | Call2 | Call3 | Call4 | Call5 | Call6 | Call7 | Call8 => {
                [K::Function, K::None, K::None]
            }

            State => [K::Float, K::Function, K::None],

            Goto => [K::Direct, K::None, K::None],

            And | Or | BitAnd | BitOr => [K::Float, K::Float, K::Float],
        }
    }

    /// For call opcodes, how many parameter slots the call populates.
    pub fn call_arg_count(self) -> Option<i32> {
        let raw = self as u16;
        if (Opcode::Call0 as u16..=Opcode::Call8 as u16).contains(&raw) {
            Some((raw - Opcode::Call0 as u16) as i32)
        } else {
            None
        }
    }
}

/// One decoded statement: 8 packed bytes on the wire.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Statement {
    pub op: Opcode,
    pub a: i16,
    pub b: i16,
    pub c: i16,
}

impl Statement {
    pub const SIZE: usize = 8;

    /// Decode one statement; `Err` carries the unknown raw opcode.
    /// The caller must supply at least [`Statement::SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Statement, u16> {
        debug_assert!(bytes.len() >= Self::SIZE);
        let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
        let op = Opcode::from_u16(raw).ok_or(raw)?;
        Ok(Statement {
            op,
            a: i16::from_le_bytes([bytes[2], bytes[3]]),
            b: i16::from_le_bytes([bytes[4], bytes[5]]),
            c: i16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn operand(&self, i: usize) -> i16 {
        match i {
            0 => self.a,
            1 => self.b,
            _ => self.c,
        }
    }
}
