use std::fmt;
use std::net::IpAddr;

/// The closed set of literal types in the Flow type system (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralType {
    Void,
    Boolean,
    Number,
    String,
    IpAddress,
    Cidr,
    RegExp,
    Handler,
    IntArray,
    StringArray,
    IpAddrArray,
    CidrArray,
}

impl LiteralType {
    /// The element type of an array literal type, if any.
    pub fn array_element(self) -> Option<LiteralType> {
        match self {
            LiteralType::IntArray => Some(LiteralType::Number),
            LiteralType::StringArray => Some(LiteralType::String),
            LiteralType::IpAddrArray => Some(LiteralType::IpAddress),
            LiteralType::CidrArray => Some(LiteralType::Cidr),
            _ => None,
        }
    }

    /// The array type whose elements are `self`, if homogeneous arrays of
    /// `self` are representable.
    pub fn array_of(self) -> Option<LiteralType> {
        match self {
            LiteralType::Number => Some(LiteralType::IntArray),
            LiteralType::String => Some(LiteralType::StringArray),
            LiteralType::IpAddress => Some(LiteralType::IpAddrArray),
            LiteralType::Cidr => Some(LiteralType::CidrArray),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiteralType::Void => "void",
            LiteralType::Boolean => "bool",
            LiteralType::Number => "int",
            LiteralType::String => "string",
            LiteralType::IpAddress => "ip",
            LiteralType::Cidr => "cidr",
            LiteralType::RegExp => "regex",
            LiteralType::Handler => "handler",
            LiteralType::IntArray => "int[]",
            LiteralType::StringArray => "string[]",
            LiteralType::IpAddrArray => "ip[]",
            LiteralType::CidrArray => "cidr[]",
        };
        f.write_str(s)
    }
}

/// A network prefix: an address plus a prefix length. Validity (prefix
/// length within the address family's bit width) is enforced at
/// construction, mirroring the lexer's CIDR literal recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    pub address: IpAddr,
    pub prefix: u8,
}

impl Cidr {
    pub fn new(address: IpAddr, prefix: u8) -> Option<Self> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            None
        } else {
            Some(Self { address, prefix })
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.address, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u32::MAX << (32 - self.prefix) };
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u128::MAX << (128 - self.prefix) };
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// A literal value carried by an AST `Expr::Literal` or an IR constant pool
/// entry. Regex literals are stored as source pattern text here; they are
/// compiled into a `regex::Regex` only when lowered into the program's
/// regex constant pool (flow-codegen), so that a `flow-syntax` dependency
/// never needs to construct a live `Regex`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Void,
    Boolean(bool),
    Number(i64),
    String(String),
    IpAddress(IpAddr),
    Cidr(Cidr),
    RegExp(String),
    Handler(String),
    IntArray(Vec<i64>),
    StringArray(Vec<String>),
    IpAddrArray(Vec<IpAddr>),
    CidrArray(Vec<Cidr>),
}

impl LiteralValue {
    pub fn kind(&self) -> LiteralType {
        match self {
            LiteralValue::Void => LiteralType::Void,
            LiteralValue::Boolean(_) => LiteralType::Boolean,
            LiteralValue::Number(_) => LiteralType::Number,
            LiteralValue::String(_) => LiteralType::String,
            LiteralValue::IpAddress(_) => LiteralType::IpAddress,
            LiteralValue::Cidr(_) => LiteralType::Cidr,
            LiteralValue::RegExp(_) => LiteralType::RegExp,
            LiteralValue::Handler(_) => LiteralType::Handler,
            LiteralValue::IntArray(_) => LiteralType::IntArray,
            LiteralValue::StringArray(_) => LiteralType::StringArray,
            LiteralValue::IpAddrArray(_) => LiteralType::IpAddrArray,
            LiteralValue::CidrArray(_) => LiteralType::CidrArray,
        }
    }
}
