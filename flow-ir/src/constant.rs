use std::collections::HashMap;
use std::net::IpAddr;

use flow_syntax::{Cidr, LiteralType};

/// A reference into one of [`ConstantPool`]'s typed arenas. Each literal
/// kind gets its own dedup space rather than one flat pool, since the
/// lexer/parser never mixes representations across kinds (spec §4.3
/// "constants: deduplicated per program"). Non-empty array literals are
/// themselves pooled constants: the instruction set (spec §4.3) has no
/// "build array from N values" opcode, so `flow-ir::builder` only lowers
/// array literals whose elements are themselves literals, folding them into
/// one of the array arenas below (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstRef {
    Number(u32),
    Str(u32),
    Ip(u32),
    Cidr(u32),
    Regex(u32),
    NumberArray(u32),
    StringArray(u32),
    IpArray(u32),
    CidrArray(u32),
    /// An empty array literal's element type (spec §3: arrays are
    /// homogeneous; an empty array constant is keyed only by the element
    /// type it was declared with, so `[]` under two different casts
    /// dedupes to the same constant iff the element type matches).
    EmptyArray(LiteralType),
}

impl ConstRef {
    pub fn kind(&self) -> LiteralType {
        match self {
            ConstRef::Number(_) => LiteralType::Number,
            ConstRef::Str(_) => LiteralType::String,
            ConstRef::Ip(_) => LiteralType::IpAddress,
            ConstRef::Cidr(_) => LiteralType::Cidr,
            ConstRef::Regex(_) => LiteralType::RegExp,
            ConstRef::NumberArray(_) => LiteralType::IntArray,
            ConstRef::StringArray(_) => LiteralType::StringArray,
            ConstRef::IpArray(_) => LiteralType::IpAddrArray,
            ConstRef::CidrArray(_) => LiteralType::CidrArray,
            ConstRef::EmptyArray(elem) => elem.array_of().expect("array-capable element type"),
        }
    }
}

/// Per-program deduplicated constant storage (spec §3 "Program owns
/// constant pools"). Lowering two occurrences of the same literal (e.g. the
/// string `"text/html"` used by two handlers) yields the same `ConstRef`.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    numbers: Vec<i64>,
    number_index: HashMap<i64, u32>,
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    ips: Vec<IpAddr>,
    ip_index: HashMap<IpAddr, u32>,
    cidrs: Vec<Cidr>,
    cidr_index: HashMap<Cidr, u32>,
    regexes: Vec<String>,
    regex_index: HashMap<String, u32>,
    number_arrays: Vec<Vec<i64>>,
    number_array_index: HashMap<Vec<i64>, u32>,
    string_arrays: Vec<Vec<String>>,
    string_array_index: HashMap<Vec<String>, u32>,
    ip_arrays: Vec<Vec<IpAddr>>,
    ip_array_index: HashMap<Vec<IpAddr>, u32>,
    cidr_arrays: Vec<Vec<Cidr>>,
    cidr_array_index: HashMap<Vec<Cidr>, u32>,
}

macro_rules! dedup_pool {
    ($fn_name:ident, $variant:ident, $store:ident, $index:ident, $ty:ty) => {
        pub fn $fn_name(&mut self, value: $ty) -> ConstRef {
            if let Some(&idx) = self.$index.get(&value) {
                return ConstRef::$variant(idx);
            }
            let idx = self.$store.len() as u32;
            self.$store.push(value.clone());
            self.$index.insert(value, idx);
            ConstRef::$variant(idx)
        }
    };
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    dedup_pool!(number, Number, numbers, number_index, i64);
    dedup_pool!(string, Str, strings, string_index, String);
    dedup_pool!(ip, Ip, ips, ip_index, IpAddr);
    dedup_pool!(cidr, Cidr, cidrs, cidr_index, Cidr);
    dedup_pool!(regex, Regex, regexes, regex_index, String);
    dedup_pool!(number_array, NumberArray, number_arrays, number_array_index, Vec<i64>);
    dedup_pool!(string_array, StringArray, string_arrays, string_array_index, Vec<String>);
    dedup_pool!(ip_array, IpArray, ip_arrays, ip_array_index, Vec<IpAddr>);
    dedup_pool!(cidr_array, CidrArray, cidr_arrays, cidr_array_index, Vec<Cidr>);

    /// `elem` is the array's ELEMENT type (matching `ConstRef::kind()`,
    /// which recovers the array type via `elem.array_of()`), not the array
    /// type itself.
    pub fn empty_array(&mut self, elem: LiteralType) -> ConstRef {
        ConstRef::EmptyArray(elem)
    }

    pub fn get_number(&self, idx: u32) -> i64 {
        self.numbers[idx as usize]
    }

    pub fn get_string(&self, idx: u32) -> &str {
        &self.strings[idx as usize]
    }

    pub fn get_ip(&self, idx: u32) -> IpAddr {
        self.ips[idx as usize]
    }

    pub fn get_cidr(&self, idx: u32) -> Cidr {
        self.cidrs[idx as usize]
    }

    pub fn get_regex(&self, idx: u32) -> &str {
        &self.regexes[idx as usize]
    }

    pub fn get_number_array(&self, idx: u32) -> &[i64] {
        &self.number_arrays[idx as usize]
    }

    pub fn get_string_array(&self, idx: u32) -> &[String] {
        &self.string_arrays[idx as usize]
    }

    pub fn get_ip_array(&self, idx: u32) -> &[IpAddr] {
        &self.ip_arrays[idx as usize]
    }

    pub fn get_cidr_array(&self, idx: u32) -> &[Cidr] {
        &self.cidr_arrays[idx as usize]
    }

    pub fn numbers(&self) -> &[i64] {
        &self.numbers
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn ips(&self) -> &[IpAddr] {
        &self.ips
    }

    pub fn cidrs(&self) -> &[Cidr] {
        &self.cidrs
    }

    pub fn regexes(&self) -> &[String] {
        &self.regexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_literal_dedupes() {
        let mut pool = ConstantPool::new();
        let a = pool.string("text/html".to_string());
        let b = pool.string("text/html".to_string());
        assert_eq!(a, b);
        assert_eq!(pool.strings().len(), 1);
    }

    #[test]
    fn distinct_numbers_get_distinct_refs() {
        let mut pool = ConstantPool::new();
        let a = pool.number(404);
        let b = pool.number(200);
        assert_ne!(a, b);
    }

    #[test]
    fn same_number_array_dedupes() {
        let mut pool = ConstantPool::new();
        let a = pool.number_array(vec![1, 2, 3]);
        let b = pool.number_array(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(pool.number_arrays.len(), 1);
    }
}
