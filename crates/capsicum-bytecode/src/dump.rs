//! JSON dump format for compiled code objects.
//!
//! The host interpreter's compiler is an external collaborator; a small host
//! side script marshals each compiled code object into this format:
//!
//! ```json
//! {
//!   "name": "<module>", "filename": "main.py", "firstlineno": 1,
//!   "argcount": 0, "kwonlyargcount": 0, "nlocals": 0,
//!   "stacksize": 1, "flags": 64,
//!   "code": [100, 0, 90, 0, 100, 1, 83, 0],
//!   "consts": [{"int": 1}, "none"],
//!   "names": ["x"], "varnames": [], "freevars": [], "cellvars": [],
//!   "lnotab": []
//! }
//! ```
//!
//! Constants are externally tagged: `"none"`, `"ellipsis"`, `{"bool": true}`,
//! `{"int": 1}`, `{"bigint": "123456789012345678901234567890"}`,
//! `{"float": 1.5}` (or `"inf"`, `"-inf"`, `"nan"`), `{"complex": [0.0, 1.0]}`,
//! `{"str": "x"}`, `{"bytes": [104, 105]}`, `{"tuple": [...]}`,
//! `{"frozenset": [...]}`, `{"code": {...}}`.

use std::sync::Arc;

use capsicum_core::DecodeError;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::code_unit::CodeUnit;
use crate::constant::Constant;
use crate::flags::CodeFlags;
use crate::instruction::decode;
use crate::line_table::LineTable;

/// Serialized code object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeDump {
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default = "default_first_line")]
    pub firstlineno: u32,
    #[serde(default)]
    pub argcount: u32,
    #[serde(default)]
    pub kwonlyargcount: u32,
    #[serde(default)]
    pub nlocals: u32,
    pub stacksize: u32,
    #[serde(default)]
    pub flags: u32,
    pub code: Vec<u8>,
    #[serde(default)]
    pub consts: Vec<ConstDump>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub varnames: Vec<String>,
    #[serde(default)]
    pub freevars: Vec<String>,
    #[serde(default)]
    pub cellvars: Vec<String>,
    #[serde(default)]
    pub lnotab: Vec<u8>,
}

fn default_first_line() -> u32 {
    1
}

/// Serialized constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstDump {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Bigint(String),
    Float(FloatDump),
    Complex(FloatDump, FloatDump),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<ConstDump>),
    Frozenset(Vec<ConstDump>),
    Code(Box<CodeDump>),
}

/// A float, with the non-finite values spelled as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloatDump {
    Number(f64),
    Special(String),
}

impl FloatDump {
    fn value(&self) -> f64 {
        match self {
            FloatDump::Number(v) => *v,
            FloatDump::Special(s) => match s.as_str() {
                "inf" | "+inf" => f64::INFINITY,
                "-inf" => f64::NEG_INFINITY,
                _ => f64::NAN,
            },
        }
    }
}

impl CodeDump {
    /// Parse a dump from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode into a [`CodeUnit`] owned by `module`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn into_code_unit(self, module: &str) -> Result<CodeUnit, DecodeError> {
        let lines = LineTable::from_lnotab(self.firstlineno, &self.lnotab);
        let instructions = decode(&self.code, &lines)?;
        let consts = self
            .consts
            .into_iter()
            .map(|c| c.into_constant(module).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CodeUnit {
            name: self.name,
            module: module.into(),
            filename: self.filename,
            first_line: self.firstlineno,
            argcount: self.argcount,
            kwonlyargcount: self.kwonlyargcount,
            nlocals: self.nlocals,
            stacksize: self.stacksize,
            flags: CodeFlags::from_bits_truncate(self.flags),
            instructions,
            code_len: self.code.len(),
            consts,
            names: intern(self.names),
            varnames: intern(self.varnames),
            freevars: intern(self.freevars),
            cellvars: intern(self.cellvars),
            lines,
        })
    }
}

fn intern(names: Vec<String>) -> Vec<Arc<str>> {
    names.into_iter().map(Arc::from).collect()
}

impl ConstDump {
    fn into_constant(self, module: &str) -> Result<Constant, DecodeError> {
        let items = |items: Vec<ConstDump>| -> Result<Vec<Arc<Constant>>, DecodeError> {
            items
                .into_iter()
                .map(|c| c.into_constant(module).map(Arc::new))
                .collect()
        };
        Ok(match self {
            ConstDump::None => Constant::None,
            ConstDump::Ellipsis => Constant::Ellipsis,
            ConstDump::Bool(b) => Constant::Bool(b),
            ConstDump::Int(v) => Constant::Int(v),
            ConstDump::Bigint(v) => Constant::BigInt(v),
            ConstDump::Float(v) => Constant::Float(OrderedFloat(v.value())),
            ConstDump::Complex(re, im) => Constant::Complex {
                real: OrderedFloat(re.value()),
                imag: OrderedFloat(im.value()),
            },
            ConstDump::Str(s) => Constant::Str(s),
            ConstDump::Bytes(b) => Constant::Bytes(b),
            ConstDump::Tuple(t) => Constant::Tuple(items(t)?),
            ConstDump::Frozenset(t) => Constant::FrozenSet(items(t)?),
            ConstDump::Code(code) => Constant::Code(Arc::new(code.into_code_unit(module)?)),
        })
    }
}
