//! Types module: the closed set of value kinds a field can carry.
//!
//! [`FieldType`] names a kind and knows which operators it supports and how to
//! reparse literal text into a value of that kind. [`FieldValue`] is a typed
//! value, with kind-specific equality, ordering, containment and slicing.

use crate::expr::ComparisonOp;
use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float,
    Bool,
    String,
    Bytes,
    Ipv4,
    Ipv6,
    Ether,
    AbsoluteTime,
    RelativeTime,
    Guid,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Ipv4(Ipv4Net),
    Ipv6(Ipv6Net),
    Ether([u8; 6]),
    AbsoluteTime(DateTime<Utc>),
    RelativeTime(TimeDelta),
    Guid([u8; 16]),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Ipv4 => "ipv4",
            FieldType::Ipv6 => "ipv6",
            FieldType::Ether => "ether",
            FieldType::AbsoluteTime => "absolute_time",
            FieldType::RelativeTime => "relative_time",
            FieldType::Guid => "guid",
        }
    }

    pub fn is_integer(&self) -> bool {
        self.int_bounds().is_some()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64
        )
    }

    /// Inclusive value range of an integer kind.
    pub fn int_bounds(&self) -> Option<(i128, i128)> {
        match self {
            FieldType::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            FieldType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            FieldType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            FieldType::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
            FieldType::UInt8 => Some((0, u8::MAX as i128)),
            FieldType::UInt16 => Some((0, u16::MAX as i128)),
            FieldType::UInt32 => Some((0, u32::MAX as i128)),
            FieldType::UInt64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// Kinds whose values have a byte representation that can be sliced.
    pub fn is_byte_like(&self) -> bool {
        matches!(
            self,
            FieldType::Bytes
                | FieldType::String
                | FieldType::Ether
                | FieldType::Guid
                | FieldType::Ipv4
                | FieldType::Ipv6
        )
    }

    pub fn supports_ordering(&self) -> bool {
        !matches!(self, FieldType::Bool | FieldType::Bytes)
    }

    pub fn supports(&self, op: ComparisonOp) -> bool {
        match op {
            ComparisonOp::Eq | ComparisonOp::Neq => true,
            ComparisonOp::Lt | ComparisonOp::Lte | ComparisonOp::Gt | ComparisonOp::Gte => {
                self.supports_ordering()
            }
            ComparisonOp::Contains | ComparisonOp::Matches => {
                matches!(self, FieldType::String | FieldType::Bytes)
            }
        }
    }

    /// Whether values of the two kinds may meet in one comparison.
    pub fn is_compatible_with(&self, other: &FieldType) -> bool {
        if self == other || (self.is_integer() && other.is_integer()) {
            return true;
        }
        match (self, other) {
            (FieldType::Bytes, peer) | (peer, FieldType::Bytes) => matches!(
                peer,
                FieldType::String | FieldType::Ether | FieldType::Guid
            ),
            _ => false,
        }
    }

    /// Reparses unquoted literal text into a value of this kind.
    pub fn parse_value(&self, text: &str) -> Result<FieldValue, String> {
        let text = text.trim();
        match self {
            FieldType::Float => text
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| format!("\"{text}\" is not a valid {}", self.name())),
            FieldType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(format!("\"{text}\" is not a valid bool")),
            },
            FieldType::String => Ok(FieldValue::String(text.to_string())),
            FieldType::Bytes => parse_bytes(text).map(FieldValue::Bytes),
            FieldType::Ipv4 => parse_ipv4(text).map(FieldValue::Ipv4),
            FieldType::Ipv6 => parse_ipv6(text).map(FieldValue::Ipv6),
            FieldType::Ether => parse_ether(text).map(FieldValue::Ether),
            FieldType::AbsoluteTime => parse_absolute_time(text).map(FieldValue::AbsoluteTime),
            FieldType::RelativeTime => parse_relative_time(text).map(FieldValue::RelativeTime),
            FieldType::Guid => parse_guid(text).map(FieldValue::Guid),
            _ => {
                let n = parse_integer(text)
                    .ok_or_else(|| format!("\"{text}\" is not a valid {}", self.name()))?;
                self.integer_value(n)
                    .ok_or_else(|| format!("{text} is out of range for {}", self.name()))
            }
        }
    }

    /// Reparses the contents of a quoted literal into a value of this kind.
    pub fn value_from_bytes(&self, bytes: &[u8]) -> Result<FieldValue, String> {
        match self {
            FieldType::Bytes => Ok(FieldValue::Bytes(bytes.to_vec())),
            FieldType::String => String::from_utf8(bytes.to_vec())
                .map(FieldValue::String)
                .map_err(|_| "string literal is not valid UTF-8".to_string()),
            _ => match std::str::from_utf8(bytes) {
                Ok(text) => self.parse_value(text),
                Err(_) => Err(format!("quoted literal is not a valid {}", self.name())),
            },
        }
    }

    /// Builds an integer value of this kind, checking its width.
    pub fn integer_value(&self, n: i128) -> Option<FieldValue> {
        let (min, max) = self.int_bounds()?;
        if n < min || n > max {
            return None;
        }
        if self.is_signed() {
            Some(FieldValue::Int(n as i64))
        } else {
            Some(FieldValue::UInt(n as u64))
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FieldValue {
    /// Whether this value may be stored in a field of kind `ty`.
    pub fn conforms_to(&self, ty: FieldType) -> bool {
        match self {
            FieldValue::Int(n) => ty.is_signed() && ty.integer_value(*n as i128).is_some(),
            FieldValue::UInt(n) => {
                ty.is_integer() && !ty.is_signed() && ty.integer_value(*n as i128).is_some()
            }
            FieldValue::Float(_) => ty == FieldType::Float,
            FieldValue::Bool(_) => ty == FieldType::Bool,
            FieldValue::String(_) => ty == FieldType::String,
            FieldValue::Bytes(_) => ty == FieldType::Bytes,
            FieldValue::Ipv4(_) => ty == FieldType::Ipv4,
            FieldValue::Ipv6(_) => ty == FieldType::Ipv6,
            FieldValue::Ether(_) => ty == FieldType::Ether,
            FieldValue::AbsoluteTime(_) => ty == FieldType::AbsoluteTime,
            FieldValue::RelativeTime(_) => ty == FieldType::RelativeTime,
            FieldValue::Guid(_) => ty == FieldType::Guid,
        }
    }

    /// Short name of the value's variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "signed integer",
            FieldValue::UInt(_) => "unsigned integer",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::String(_) => "string",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Ipv4(_) => "ipv4",
            FieldValue::Ipv6(_) => "ipv6",
            FieldValue::Ether(_) => "ether",
            FieldValue::AbsoluteTime(_) => "absolute_time",
            FieldValue::RelativeTime(_) => "relative_time",
            FieldValue::Guid(_) => "guid",
        }
    }

    /// Raw byte representation of byte-like values.
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            FieldValue::Bytes(b) => Some(Cow::Borrowed(b)),
            FieldValue::String(s) => Some(Cow::Borrowed(s.as_bytes())),
            FieldValue::Ether(b) => Some(Cow::Borrowed(b)),
            FieldValue::Guid(b) => Some(Cow::Borrowed(b)),
            FieldValue::Ipv4(net) => Some(Cow::Owned(net.addr().octets().to_vec())),
            FieldValue::Ipv6(net) => Some(Cow::Owned(net.addr().octets().to_vec())),
            _ => None,
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            FieldValue::Int(n) => Some(*n as i128),
            FieldValue::UInt(n) => Some(*n as i128),
            _ => None,
        }
    }

    /// Value equality under the kind's rules. Address prefixes compare as
    /// subnets, strings optionally ignore case.
    pub fn equals(&self, other: &FieldValue, ignore_case: bool) -> bool {
        match (self, other) {
            (FieldValue::Ipv4(a), FieldValue::Ipv4(b)) => ipv4_same_network(a, b),
            (FieldValue::Ipv6(a), FieldValue::Ipv6(b)) => ipv6_same_network(a, b),
            _ => self.compare(other, ignore_case) == Some(Ordering::Equal),
        }
    }

    /// Native ordering of two values, `None` when they are not comparable.
    pub fn compare(&self, other: &FieldValue, ignore_case: bool) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Float(a), b) => b.as_i128().and_then(|b| a.partial_cmp(&(b as f64))),
            (a, FieldValue::Float(b)) => a.as_i128().and_then(|a| (a as f64).partial_cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::String(a), FieldValue::String(b)) => Some(if ignore_case {
                a.chars()
                    .flat_map(char::to_lowercase)
                    .cmp(b.chars().flat_map(char::to_lowercase))
            } else {
                a.cmp(b)
            }),
            (FieldValue::Ipv4(a), FieldValue::Ipv4(b)) => {
                Some(a.addr().cmp(&b.addr()).then(a.prefix_len().cmp(&b.prefix_len())))
            }
            (FieldValue::Ipv6(a), FieldValue::Ipv6(b)) => {
                Some(a.addr().cmp(&b.addr()).then(a.prefix_len().cmp(&b.prefix_len())))
            }
            (FieldValue::AbsoluteTime(a), FieldValue::AbsoluteTime(b)) => Some(a.cmp(b)),
            (FieldValue::RelativeTime(a), FieldValue::RelativeTime(b)) => Some(a.cmp(b)),
            _ => match (self.as_bytes(), other.as_bytes()) {
                (Some(a), Some(b)) => Some(a.as_ref().cmp(b.as_ref())),
                _ => None,
            },
        }
    }

    /// Substring / subsequence test for strings and byte sequences.
    pub fn contains(&self, needle: &FieldValue, ignore_case: bool) -> bool {
        if let (FieldValue::String(h), FieldValue::String(n)) = (self, needle) {
            if ignore_case {
                return h.to_lowercase().contains(&n.to_lowercase());
            }
            return h.contains(n.as_str());
        }
        match (self.as_bytes(), needle.as_bytes()) {
            (Some(h), Some(n)) => {
                n.is_empty() || h.windows(n.len()).any(|window| window == n.as_ref())
            }
            _ => false,
        }
    }

    /// Bitwise and of two integers, keeping the left operand's signedness.
    pub fn bitand(&self, mask: &FieldValue) -> Option<FieldValue> {
        match (self, mask.as_i128()?) {
            (FieldValue::Int(n), m) => Some(FieldValue::Int(n & (m as i64))),
            (FieldValue::UInt(n), m) => Some(FieldValue::UInt(n & (m as u64))),
            _ => None,
        }
    }

    /// Byte length of the value's raw representation.
    pub fn byte_len(&self) -> Option<usize> {
        self.as_bytes().map(|b| b.len())
    }

    /// Strict identity used to deduplicate constants; floats compare by bits.
    pub fn identical(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::UInt(n) => write!(f, "{n}"),
            FieldValue::Float(x) => write!(f, "{x:?}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c if c.is_ascii_control() => write!(f, "\\x{:02x}", c as u32)?,
                        // escaped as UTF-8 so the lexer reads back a valid string
                        c if c.is_control() => {
                            let mut buf = [0u8; 4];
                            for b in c.encode_utf8(&mut buf).bytes() {
                                write!(f, "\\x{b:02x}")?;
                            }
                        }
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
            FieldValue::Bytes(b) => write_hex(f, b, ':'),
            FieldValue::Ipv4(net) if net.prefix_len() == 32 => write!(f, "{}", net.addr()),
            FieldValue::Ipv4(net) => write!(f, "{net}"),
            FieldValue::Ipv6(net) if net.prefix_len() == 128 => write!(f, "{}", net.addr()),
            FieldValue::Ipv6(net) => write!(f, "{net}"),
            FieldValue::Ether(b) => write_hex(f, b, ':'),
            FieldValue::AbsoluteTime(t) => write!(f, "\"{}\"", t.format("%Y-%m-%d %H:%M:%S%.9f")),
            FieldValue::RelativeTime(d) => {
                let sign = if *d < TimeDelta::zero() { "-" } else { "" };
                let d = d.abs();
                write!(f, "{sign}{}.{:09}", d.num_seconds(), d.subsec_nanos())
            }
            FieldValue::Guid(b) => {
                write_hex(f, &b[..4], '\0')?;
                for chunk in [&b[4..6], &b[6..8], &b[8..10], &b[10..]] {
                    f.write_str("-")?;
                    write_hex(f, chunk, '\0')?;
                }
                Ok(())
            }
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8], sep: char) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && sep != '\0' {
            write!(f, "{sep}")?;
        }
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

fn ipv4_same_network(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    let len = a.prefix_len().min(b.prefix_len());
    match (Ipv4Net::new(a.addr(), len), Ipv4Net::new(b.addr(), len)) {
        (Ok(a), Ok(b)) => a.network() == b.network(),
        _ => false,
    }
}

fn ipv6_same_network(a: &Ipv6Net, b: &Ipv6Net) -> bool {
    let len = a.prefix_len().min(b.prefix_len());
    match (Ipv6Net::new(a.addr(), len), Ipv6Net::new(b.addr(), len)) {
        (Ok(a), Ok(b)) => a.network() == b.network(),
        _ => false,
    }
}

/// Parses decimal, `0x`, `0o` and `0b` integers with an optional sign.
pub(crate) fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex.to_string())
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct.to_string())
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin.to_string())
    } else {
        (10, lower)
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    let value = i128::from_str_radix(&body, radix).ok()?;
    Some(if negative { -value } else { value })
}

fn hex_group(part: &str, text: &str) -> Result<u8, String> {
    if part.is_empty() || part.len() > 2 {
        return Err(format!("\"{text}\" is not a valid byte string"));
    }
    u8::from_str_radix(part, 16).map_err(|_| format!("\"{text}\" is not a valid byte string"))
}

fn parse_bytes(text: &str) -> Result<Vec<u8>, String> {
    let invalid = || format!("\"{text}\" is not a valid byte string");
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.is_empty() || hex.len() % 2 != 0 {
            return Err(invalid());
        }
        return (0..hex.len())
            .step_by(2)
            .map(|i| hex.get(i..i + 2).ok_or_else(invalid).and_then(|p| hex_group(p, text)))
            .collect();
    }
    if let Some(sep) = [':', '-', '.'].into_iter().find(|c| text.contains(*c)) {
        return text.split(sep).map(|part| hex_group(part, text)).collect();
    }
    match text.len() {
        1 | 2 => hex_group(text, text).map(|b| vec![b]),
        n if n % 2 == 0 => (0..n)
            .step_by(2)
            .map(|i| text.get(i..i + 2).ok_or_else(invalid).and_then(|p| hex_group(p, text)))
            .collect(),
        _ => Err(invalid()),
    }
}

fn parse_ipv4(text: &str) -> Result<Ipv4Net, String> {
    let invalid = || format!("\"{text}\" is not a valid IPv4 address");
    let (addr, prefix) = match text.split_once('/') {
        Some((addr, len)) => (addr, len.parse::<u8>().map_err(|_| invalid())?),
        None => (text, 32),
    };
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    Ipv4Net::new(addr, prefix).map_err(|_| format!("invalid IPv4 prefix length in \"{text}\""))
}

fn parse_ipv6(text: &str) -> Result<Ipv6Net, String> {
    let invalid = || format!("\"{text}\" is not a valid IPv6 address");
    let (addr, prefix) = match text.split_once('/') {
        Some((addr, len)) => (addr, len.parse::<u8>().map_err(|_| invalid())?),
        None => (text, 128),
    };
    let addr: Ipv6Addr = addr.parse().map_err(|_| invalid())?;
    Ipv6Net::new(addr, prefix).map_err(|_| format!("invalid IPv6 prefix length in \"{text}\""))
}

fn parse_ether(text: &str) -> Result<[u8; 6], String> {
    let invalid = || format!("\"{text}\" is not a valid Ethernet address");
    // Cisco dotted form: aabb.ccdd.eeff
    let groups: Vec<&str> = text.split('.').collect();
    let bytes = if groups.len() == 3 && groups.iter().all(|g| g.len() == 4) {
        parse_bytes(&groups.concat()).map_err(|_| invalid())?
    } else {
        parse_bytes(text).map_err(|_| invalid())?
    };
    bytes.try_into().map_err(|_| invalid())
}

fn parse_guid(text: &str) -> Result<[u8; 16], String> {
    let invalid = || format!("\"{text}\" is not a valid GUID");
    let groups: Vec<&str> = text.split('-').collect();
    let hex = match groups.as_slice() {
        [a, b, c, d, e]
            if a.len() == 8 && b.len() == 4 && c.len() == 4 && d.len() == 4 && e.len() == 12 =>
        {
            groups.concat()
        }
        [plain] if plain.len() == 32 => plain.to_string(),
        _ => return Err(invalid()),
    };
    let mut out = [0u8; 16];
    for (i, slot) in out.iter_mut().enumerate() {
        let pair = hex.get(i * 2..i * 2 + 2).ok_or_else(invalid)?;
        *slot = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
    }
    Ok(out)
}

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%b %d, %Y %H:%M:%S%.f",
    "%b %d, %Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn parse_absolute_time(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    // Seconds since the epoch.
    if let Ok(delta) = parse_relative_time(text) {
        if delta >= TimeDelta::zero() {
            if let chrono::LocalResult::Single(t) =
                Utc.timestamp_opt(delta.num_seconds(), delta.subsec_nanos().unsigned_abs())
            {
                return Ok(t);
            }
        }
    }
    Err(format!("\"{text}\" is not a valid absolute time"))
}

fn parse_relative_time(text: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("\"{text}\" is not a valid relative time");
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (secs, frac) = body.split_once('.').unwrap_or((body, ""));
    if secs.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(secs) || !all_digits(frac) || frac.len() > 9 {
        return Err(invalid());
    }
    let secs: i128 = if secs.is_empty() { 0 } else { secs.parse().map_err(|_| invalid())? };
    let nanos: i128 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse().map_err(|_| invalid())?
    };
    let mut total = secs
        .checked_mul(1_000_000_000)
        .and_then(|t| t.checked_add(nanos))
        .ok_or_else(|| format!("\"{text}\" is out of range for a relative time"))?;
    if negative {
        total = -total;
    }
    let whole = i64::try_from(total.div_euclid(1_000_000_000)).map_err(|_| invalid())?;
    let rem = total.rem_euclid(1_000_000_000) as u32;
    TimeDelta::new(whole, rem).ok_or_else(invalid)
}
