use std::net::IpAddr;

use flow_syntax::Cidr;

use crate::value::Value;

/// Typed argument accessors a native builtin uses to read its call operands
/// (spec §4.6 "Native-call ABI": "a `Params` object providing typed
/// accessors"). Argument count and kind were already fixed by the type
/// checker at parse time, so every accessor trusts its index/kind rather
/// than re-validating — a mismatch here means the IR generator produced a
/// call that doesn't match its own resolved signature, which is a bug in
/// `flow-ir`/`flow-parser`, not a condition a builtin should recover from.
pub struct Params<'a> {
    values: &'a [Value],
    regex_groups: &'a [Option<String>],
}

impl<'a> Params<'a> {
    pub fn new(values: &'a [Value], regex_groups: &'a [Option<String>]) -> Self {
        Self { values, regex_groups }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, i: usize) -> &Value {
        &self.values[i]
    }

    pub fn get_bool(&self, i: usize) -> bool {
        self.values[i].as_bool()
    }

    pub fn get_int(&self, i: usize) -> i64 {
        self.values[i].as_number()
    }

    pub fn get_string(&self, i: usize) -> &str {
        self.values[i].as_str()
    }

    pub fn get_ip(&self, i: usize) -> IpAddr {
        self.values[i].as_ip()
    }

    pub fn get_cidr(&self, i: usize) -> Cidr {
        self.values[i].as_cidr()
    }

    pub fn get_regex(&self, i: usize) -> &regex::Regex {
        self.values[i].as_regex()
    }

    pub fn get_handler(&self, i: usize) -> u32 {
        self.values[i].as_handler()
    }

    pub fn get_int_array(&self, i: usize) -> &[i64] {
        self.values[i].as_number_array()
    }

    pub fn get_string_array(&self, i: usize) -> &[String] {
        self.values[i].as_string_array()
    }

    pub fn get_ip_array(&self, i: usize) -> &[IpAddr] {
        self.values[i].as_ip_array()
    }

    pub fn get_cidr_array(&self, i: usize) -> &[Cidr] {
        self.values[i].as_cidr_array()
    }

    /// `regex.group(i)`'s backing store (spec §4.6 "a per-call regex-match
    /// result slot"): the capture groups of the most recent `=~` evaluated
    /// by the calling handler invocation, group 0 being the whole match.
    pub fn group(&self, i: usize) -> Option<&str> {
        self.regex_groups.get(i).and_then(|g| g.as_deref())
    }
}
