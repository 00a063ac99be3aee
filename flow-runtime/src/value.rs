use std::net::IpAddr;
use std::rc::Rc;

use flow_syntax::{Cidr, LiteralType};

/// A runtime register value (spec component H "a typed register file over
/// the literal types plus handle pointers"). Strings and arrays are
/// reference-counted rather than cloned byte-for-byte: a handler that loads
/// the same string constant into several registers, or threads one array
/// value through several `Load`/`Store` pairs, shouldn't pay for a deep copy
/// every time a `Runner` steps.
///
/// `Rc`, not `Arc`: the runtime is single-threaded-cooperative per worker
/// (spec §5 "each single-threaded and cooperative"; see `Runner` module doc
/// for the worker-per-`LocalSet` architecture this implies), so values never
/// cross an OS thread boundary while live.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Number(i64),
    String(Rc<str>),
    Ip(IpAddr),
    Cidr(Cidr),
    /// Carries the compiled pattern, not just its source text, so
    /// `=~`/`regex.group` never recompile per match (see
    /// `crate::linked::LinkedProgram::regexes`).
    Regex(Rc<regex::Regex>),
    /// Index into the owning `flow_codegen::Program::handlers`.
    Handler(u32),
    NumberArray(Rc<[i64]>),
    StringArray(Rc<[String]>),
    IpArray(Rc<[IpAddr]>),
    CidrArray(Rc<[Cidr]>),
}

impl Value {
    pub fn kind(&self) -> LiteralType {
        match self {
            Value::Void => LiteralType::Void,
            Value::Bool(_) => LiteralType::Boolean,
            Value::Number(_) => LiteralType::Number,
            Value::String(_) => LiteralType::String,
            Value::Ip(_) => LiteralType::IpAddress,
            Value::Cidr(_) => LiteralType::Cidr,
            Value::Regex(_) => LiteralType::RegExp,
            Value::Handler(_) => LiteralType::Handler,
            Value::NumberArray(_) => LiteralType::IntArray,
            Value::StringArray(_) => LiteralType::StringArray,
            Value::IpArray(_) => LiteralType::IpAddrArray,
            Value::CidrArray(_) => LiteralType::CidrArray,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            other => unreachable!("expected bool register, found {:?}", other.kind()),
        }
    }

    pub fn as_number(&self) -> i64 {
        match self {
            Value::Number(n) => *n,
            other => unreachable!("expected number register, found {:?}", other.kind()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::String(s) => s,
            other => unreachable!("expected string register, found {:?}", other.kind()),
        }
    }

    pub fn as_ip(&self) -> IpAddr {
        match self {
            Value::Ip(ip) => *ip,
            other => unreachable!("expected ip register, found {:?}", other.kind()),
        }
    }

    pub fn as_cidr(&self) -> Cidr {
        match self {
            Value::Cidr(c) => *c,
            other => unreachable!("expected cidr register, found {:?}", other.kind()),
        }
    }

    pub fn as_regex(&self) -> &regex::Regex {
        match self {
            Value::Regex(r) => r,
            other => unreachable!("expected regex register, found {:?}", other.kind()),
        }
    }

    pub fn as_handler(&self) -> u32 {
        match self {
            Value::Handler(h) => *h,
            other => unreachable!("expected handler register, found {:?}", other.kind()),
        }
    }

    pub fn as_number_array(&self) -> &[i64] {
        match self {
            Value::NumberArray(a) => a,
            other => unreachable!("expected int[] register, found {:?}", other.kind()),
        }
    }

    pub fn as_string_array(&self) -> &[String] {
        match self {
            Value::StringArray(a) => a,
            other => unreachable!("expected string[] register, found {:?}", other.kind()),
        }
    }

    pub fn as_ip_array(&self) -> &[IpAddr] {
        match self {
            Value::IpArray(a) => a,
            other => unreachable!("expected ip[] register, found {:?}", other.kind()),
        }
    }

    pub fn as_cidr_array(&self) -> &[Cidr] {
        match self {
            Value::CidrArray(a) => a,
            other => unreachable!("expected cidr[] register, found {:?}", other.kind()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Ip(ip) => write!(f, "{ip}"),
            Value::Cidr(c) => write!(f, "{c}"),
            Value::Regex(r) => write!(f, "{}", r.as_str()),
            Value::Handler(h) => write!(f, "<handler #{h}>"),
            Value::NumberArray(a) => write!(f, "{a:?}"),
            Value::StringArray(a) => write!(f, "{a:?}"),
            Value::IpArray(a) => write!(f, "{a:?}"),
            Value::CidrArray(a) => write!(f, "{a:?}"),
        }
    }
}
