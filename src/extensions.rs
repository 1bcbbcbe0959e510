//! Extension types and functions, registered by name.
//!
//! Two extension types are built in: `ipaddr` (constructed with `ip("..")`)
//! and `decimal` (constructed with `decimal("..")`). Each carries its own
//! parsing and equality rules; every function is reachable through
//! [`Extensions::call`], which is how the evaluator dispatches both free
//! calls (`ip("10.0.0.1")`) and method calls (`x.isInRange(y)`, where the
//! receiver is passed as the first argument).

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::net::IpAddr;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::EvaluationError;
use crate::types::{Value, ValueError};

/// The process-wide registry of built-in extensions.
pub static EXTENSIONS: Lazy<Extensions> = Lazy::new(Extensions::builtin);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionValue {
    Ip(IpNet),
    Decimal(Decimal),
}

impl ExtensionValue {
    /// The extension type tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ExtensionValue::Ip(_) => "ipaddr",
            ExtensionValue::Decimal(_) => "decimal",
        }
    }

    /// The constructor function that produces values of this type.
    pub fn constructor(&self) -> &'static str {
        match self {
            ExtensionValue::Ip(_) => "ip",
            ExtensionValue::Decimal(_) => "decimal",
        }
    }
}

impl Display for ExtensionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExtensionValue::Ip(net) => write!(f, "{net}"),
            ExtensionValue::Decimal(d) => write!(f, "{d}"),
        }
    }
}

/// An IP address with a prefix length; a bare address has a full-width
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    fn width(addr: &IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    fn bits(&self) -> u128 {
        match self.addr {
            IpAddr::V4(v4) => u128::from(u32::from(v4)),
            IpAddr::V6(v6) => u128::from(v6),
        }
    }

    fn masked(&self, prefix: u8) -> u128 {
        let width = Self::width(&self.addr);
        if prefix == 0 {
            return 0;
        }
        let shift = u32::from(width - prefix);
        (self.bits() >> shift) << shift
    }

    /// True when every address in `self` also lies in `other`.
    pub fn is_in_range(&self, other: &IpNet) -> bool {
        self.is_ipv4() == other.is_ipv4()
            && self.prefix >= other.prefix
            && self.masked(other.prefix) == other.masked(other.prefix)
    }

    pub fn is_loopback(&self) -> bool {
        let range = if self.is_ipv4() { "127.0.0.0/8" } else { "::1/128" };
        range
            .parse::<IpNet>()
            .is_ok_and(|range| self.is_in_range(&range))
    }

    pub fn is_multicast(&self) -> bool {
        let range = if self.is_ipv4() { "224.0.0.0/4" } else { "ff00::/8" };
        range
            .parse::<IpNet>()
            .is_ok_and(|range| self.is_in_range(&range))
    }
}

impl FromStr for IpNet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("`{s}` is not a valid IP address"))?;
        let width = Self::width(&addr);
        let prefix = match prefix {
            None => width,
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= width)
                .ok_or_else(|| format!("`{s}` has an invalid prefix length"))?,
        };
        Ok(Self { addr, prefix })
    }
}

impl Display for IpNet {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.prefix == Self::width(&self.addr) {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}/{}", self.addr, self.prefix)
        }
    }
}

/// Fixed-point decimal with four fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Decimal(i64);

impl Decimal {
    const DIGITS: u32 = 4;
    const SCALE: i64 = 10_000;

    pub fn scaled(&self) -> i64 {
        self.0
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("`{s}` is not a valid decimal");
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = body.split_once('.').ok_or_else(invalid)?;
        let digits_only = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
        if !digits_only(whole) || !digits_only(frac) {
            return Err(invalid());
        }
        if frac.len() > Self::DIGITS as usize {
            return Err(format!("`{s}` has more than {} fractional digits", Self::DIGITS));
        }
        let overflow = || format!("`{s}` is out of range");
        let whole: i128 = whole.parse().map_err(|_| overflow())?;
        let padded = format!("{frac:0<width$}", width = Self::DIGITS as usize);
        let frac: i128 = padded.parse().map_err(|_| invalid())?;
        // The negative range is one step wider, so narrow after applying the sign.
        let magnitude = whole
            .checked_mul(i128::from(Self::SCALE))
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(overflow)?;
        let scaled = if negative { -magnitude } else { magnitude };
        i64::try_from(scaled).map(Decimal).map_err(|_| overflow())
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE.unsigned_abs();
        let frac = format!("{:04}", abs % scale);
        let frac = frac.trim_end_matches('0');
        let frac = if frac.is_empty() { "0" } else { frac };
        write!(f, "{sign}{}.{frac}", abs / scale)
    }
}

/// Signature shared by all extension functions.
pub type ExtensionFn = fn(&[Value]) -> Result<Value, EvaluationError>;

#[derive(Clone, Copy)]
pub struct ExtensionFunction {
    pub name: &'static str,
    pub arity: usize,
    call: ExtensionFn,
}

impl std::fmt::Debug for ExtensionFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtensionFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

type Constructor = fn(&str) -> Result<ExtensionValue, String>;

/// Registry of extension constructors and functions.
#[derive(Debug, Default)]
pub struct Extensions {
    functions: HashMap<&'static str, ExtensionFunction>,
    constructors: HashMap<&'static str, Constructor>,
}

impl Extensions {
    pub fn builtin() -> Self {
        let mut ext = Self::default();

        ext.register_constructor("ip", |s| s.parse().map(ExtensionValue::Ip));
        ext.register_constructor("decimal", |s| s.parse().map(ExtensionValue::Decimal));

        ext.register("ip", 1, |args| construct_from_string("ip", &args[0]));
        ext.register("decimal", 1, |args| construct_from_string("decimal", &args[0]));

        ext.register("isIpv4", 1, |args| Ok(ip_arg(&args[0])?.is_ipv4().into()));
        ext.register("isIpv6", 1, |args| Ok(ip_arg(&args[0])?.is_ipv6().into()));
        ext.register("isLoopback", 1, |args| {
            Ok(ip_arg(&args[0])?.is_loopback().into())
        });
        ext.register("isMulticast", 1, |args| {
            Ok(ip_arg(&args[0])?.is_multicast().into())
        });
        ext.register("isInRange", 2, |args| {
            Ok(ip_arg(&args[0])?.is_in_range(ip_arg(&args[1])?).into())
        });

        ext.register("lessThan", 2, |args| decimal_cmp(args, |a, b| a < b));
        ext.register("lessThanOrEqual", 2, |args| decimal_cmp(args, |a, b| a <= b));
        ext.register("greaterThan", 2, |args| decimal_cmp(args, |a, b| a > b));
        ext.register("greaterThanOrEqual", 2, |args| {
            decimal_cmp(args, |a, b| a >= b)
        });

        ext
    }

    pub fn register(&mut self, name: &'static str, arity: usize, call: ExtensionFn) {
        self.functions
            .insert(name, ExtensionFunction { name, arity, call });
    }

    pub fn register_constructor(&mut self, name: &'static str, constructor: Constructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn function(&self, name: &str) -> Option<&ExtensionFunction> {
        self.functions.get(name)
    }

    /// Parse an extension literal, e.g. from the JSON `__extn` form.
    pub fn construct(&self, name: &str, arg: &str) -> Result<ExtensionValue, ValueError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ValueError::UnknownExtension(name.to_string()))?;
        constructor(arg).map_err(|message| ValueError::InvalidExtension {
            name: name.to_string(),
            message,
        })
    }

    /// Dispatch a call by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvaluationError> {
        let function = self
            .function(name)
            .ok_or_else(|| EvaluationError::unknown_function(name))?;
        if args.len() != function.arity {
            return Err(EvaluationError::extension(
                name,
                format!("expected {} argument(s), got {}", function.arity, args.len()),
            ));
        }
        (function.call)(args)
    }
}

fn construct_from_string(name: &str, arg: &Value) -> Result<Value, EvaluationError> {
    let text = arg.as_string()?;
    EXTENSIONS
        .construct(name, text)
        .map(Value::Extension)
        .map_err(|e| EvaluationError::extension(name, e))
}

fn ip_arg(value: &Value) -> Result<&IpNet, EvaluationError> {
    match value.as_extension()? {
        ExtensionValue::Ip(net) => Ok(net),
        other => Err(EvaluationError::type_mismatch("ipaddr", other.tag())),
    }
}

fn decimal_arg(value: &Value) -> Result<Decimal, EvaluationError> {
    match value.as_extension()? {
        ExtensionValue::Decimal(d) => Ok(*d),
        other => Err(EvaluationError::type_mismatch("decimal", other.tag())),
    }
}

fn decimal_cmp(args: &[Value], cmp: fn(Decimal, Decimal) -> bool) -> Result<Value, EvaluationError> {
    Ok(cmp(decimal_arg(&args[0])?, decimal_arg(&args[1])?).into())
}
