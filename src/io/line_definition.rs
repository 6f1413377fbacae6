//! Typed schemas for one-object-per-line input.
//!
//! A [`LineDefinition`] is a list of components built with
//! [`LineDefinition::builder`]. Required components are matched in order;
//! optional named components follow in any order, each at most once.
//!
//! ```
//! use mesh_deck::io::line_definition::LineDefinition;
//! let def = LineDefinition::builder()
//!     .add_named_int("MAT")
//!     .add_tag("MAT_fluid")
//!     .add_named_double("DENSITY")
//!     .add_optional_named_double("GAMMA")
//!     .with_default(0.0)
//!     .build();
//! let c = def.read("MAT 2 MAT_fluid DENSITY 1.5").unwrap();
//! assert_eq!(c.get::<i32>("MAT").unwrap(), 2);
//! assert_eq!(c.get::<f64>("GAMMA").unwrap(), 0.0);
//! ```

use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use crate::io::reader::DeckReader;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One parsed value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Flag,
    Int(i64),
    Double(f64),
    Str(String),
    IntVec(Vec<i64>),
    DoubleVec(Vec<f64>),
    StrVec(Vec<String>),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}
impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Double(v)
    }
}
impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}
impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::DoubleVec(v)
    }
}
impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::IntVec(v)
    }
}

/// Conversion out of a [`ParamValue`].
pub trait FromParamValue: Sized {
    const EXPECTED: &'static str;
    fn from_param(v: &ParamValue) -> Option<Self>;
}

impl FromParamValue for i64 {
    const EXPECTED: &'static str = "integer";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromParamValue for i32 {
    const EXPECTED: &'static str = "integer";
    fn from_param(v: &ParamValue) -> Option<Self> {
        i64::from_param(v).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromParamValue for usize {
    const EXPECTED: &'static str = "non-negative integer";
    fn from_param(v: &ParamValue) -> Option<Self> {
        i64::from_param(v).and_then(|i| usize::try_from(i).ok())
    }
}

impl FromParamValue for f64 {
    const EXPECTED: &'static str = "real number";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::Double(d) => Some(*d),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromParamValue for String {
    const EXPECTED: &'static str = "string";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromParamValue for Vec<i64> {
    const EXPECTED: &'static str = "integer vector";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::IntVec(x) => Some(x.clone()),
            _ => None,
        }
    }
}

impl FromParamValue for Vec<i32> {
    const EXPECTED: &'static str = "integer vector";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::IntVec(x) => x.iter().map(|&i| i32::try_from(i).ok()).collect(),
            _ => None,
        }
    }
}

impl FromParamValue for Vec<f64> {
    const EXPECTED: &'static str = "real vector";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::DoubleVec(x) => Some(x.clone()),
            ParamValue::IntVec(x) => Some(x.iter().map(|&i| i as f64).collect()),
            _ => None,
        }
    }
}

impl FromParamValue for Vec<String> {
    const EXPECTED: &'static str = "string vector";
    fn from_param(v: &ParamValue) -> Option<Self> {
        match v {
            ParamValue::StrVec(x) => Some(x.clone()),
            _ => None,
        }
    }
}

/// Named values read from one line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputParameterContainer {
    values: BTreeMap<String, ParamValue>,
}

impl InputParameterContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Typed value; missing or mistyped entries are an error.
    pub fn get<T: FromParamValue>(&self, name: &str) -> Result<T, DeckError> {
        let invalid = |value: String| DeckError::InvalidParameter {
            key: name.to_string(),
            value,
            expected: T::EXPECTED,
        };
        let v = self
            .values
            .get(name)
            .ok_or_else(|| invalid("<missing>".into()))?;
        T::from_param(v).ok_or_else(|| invalid(format!("{v:?}")))
    }

    pub fn get_opt<T: FromParamValue>(&self, name: &str) -> Option<T> {
        self.values.get(name).and_then(T::from_param)
    }

    pub fn get_or<T: FromParamValue>(&self, name: &str, default: T) -> T {
        self.get_opt(name).unwrap_or(default)
    }

    /// Whether an optional tag was given.
    pub fn has_flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Flag))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }
}

#[derive(Clone, Debug, PartialEq)]
enum VecLen {
    Fixed(usize),
    /// Taken from a named int read earlier on the same line.
    From(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Kind {
    Tag,
    Int,
    Double,
    Str,
    IntVec(VecLen),
    DoubleVec(VecLen),
    StrVec(VecLen),
}

impl Kind {
    fn scalar_name(&self) -> &'static str {
        match self {
            Kind::Tag => "",
            Kind::Int | Kind::IntVec(_) => "int",
            Kind::Double | Kind::DoubleVec(_) => "double",
            Kind::Str | Kind::StrVec(_) => "string",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Component {
    name: String,
    kind: Kind,
    /// Named components are preceded by their name token.
    named: bool,
    optional: bool,
    default: Option<ParamValue>,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        if self.named || self.kind == Kind::Tag {
            s.push_str(&self.name);
        }
        let value = match &self.kind {
            Kind::Tag => String::new(),
            Kind::Int | Kind::Double | Kind::Str => format!("<{}>", self.kind.scalar_name()),
            Kind::IntVec(len) | Kind::DoubleVec(len) | Kind::StrVec(len) => match len {
                VecLen::Fixed(n) => format!("<{}>x{n}", self.kind.scalar_name()),
                VecLen::From(key) => format!("<{}>x{key}", self.kind.scalar_name()),
            },
        };
        if !value.is_empty() {
            if !s.is_empty() {
                s.push(' ');
            }
            if !self.named {
                // unnamed values show their name for orientation
                s.push_str(&value.replacen('<', &format!("<{}:", self.name), 1));
            } else {
                s.push_str(&value);
            }
        }
        if self.optional {
            write!(f, "[{s}]")
        } else {
            write!(f, "{s}")
        }
    }
}

/// A line schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineDefinition {
    required: Vec<Component>,
    optional: Vec<Component>,
}

/// Builder for [`LineDefinition`].
#[derive(Clone, Debug, Default)]
pub struct LineDefinitionBuilder {
    def: LineDefinition,
    last_optional: bool,
}

impl LineDefinitionBuilder {
    fn push(mut self, name: &str, kind: Kind, named: bool, optional: bool) -> Self {
        let c = Component {
            name: name.to_string(),
            kind,
            named,
            optional,
            default: None,
        };
        if optional {
            self.def.optional.push(c);
        } else {
            self.def.required.push(c);
        }
        self.last_optional = optional;
        self
    }

    /// A literal token that must appear.
    pub fn add_tag(self, name: &str) -> Self {
        self.push(name, Kind::Tag, false, false)
    }
    /// A positional string.
    pub fn add_string(self, name: &str) -> Self {
        self.push(name, Kind::Str, false, false)
    }
    /// A positional int.
    pub fn add_int(self, name: &str) -> Self {
        self.push(name, Kind::Int, false, false)
    }
    pub fn add_int_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::IntVec(VecLen::Fixed(len)), false, false)
    }
    pub fn add_double_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::DoubleVec(VecLen::Fixed(len)), false, false)
    }
    pub fn add_named_int(self, name: &str) -> Self {
        self.push(name, Kind::Int, true, false)
    }
    pub fn add_named_double(self, name: &str) -> Self {
        self.push(name, Kind::Double, true, false)
    }
    pub fn add_named_string(self, name: &str) -> Self {
        self.push(name, Kind::Str, true, false)
    }
    pub fn add_named_int_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::IntVec(VecLen::Fixed(len)), true, false)
    }
    pub fn add_named_double_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::DoubleVec(VecLen::Fixed(len)), true, false)
    }
    pub fn add_named_string_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::StrVec(VecLen::Fixed(len)), true, false)
    }
    /// Int vector whose length is the value of the named int `length_key`.
    pub fn add_named_int_vector_from(self, name: &str, length_key: &str) -> Self {
        self.push(name, Kind::IntVec(VecLen::From(length_key.into())), true, false)
    }
    /// Double vector whose length is the value of the named int `length_key`.
    pub fn add_named_double_vector_from(self, name: &str, length_key: &str) -> Self {
        self.push(name, Kind::DoubleVec(VecLen::From(length_key.into())), true, false)
    }

    pub fn add_optional_tag(self, name: &str) -> Self {
        self.push(name, Kind::Tag, true, true)
    }
    pub fn add_optional_named_int(self, name: &str) -> Self {
        self.push(name, Kind::Int, true, true)
    }
    pub fn add_optional_named_double(self, name: &str) -> Self {
        self.push(name, Kind::Double, true, true)
    }
    pub fn add_optional_named_string(self, name: &str) -> Self {
        self.push(name, Kind::Str, true, true)
    }
    pub fn add_optional_named_int_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::IntVec(VecLen::Fixed(len)), true, true)
    }
    pub fn add_optional_named_double_vector(self, name: &str, len: usize) -> Self {
        self.push(name, Kind::DoubleVec(VecLen::Fixed(len)), true, true)
    }

    /// Default for the optional component added last. Ignored after a
    /// required component.
    pub fn with_default(mut self, value: impl Into<ParamValue>) -> Self {
        if self.last_optional {
            if let Some(c) = self.def.optional.last_mut() {
                c.default = Some(value.into());
            }
        }
        self
    }

    pub fn build(self) -> LineDefinition {
        self.def
    }
}

/// Cursor over the tokens of one line.
struct Tokens<'a> {
    line: &'a str,
    expected: &'a LineDefinition,
    toks: Vec<&'a str>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn error(&self, reason: impl Into<String>) -> DeckError {
        DeckError::LineDefinition {
            line: self.line.to_string(),
            expected: self.expected.to_string(),
            reason: reason.into(),
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str, DeckError> {
        let t = self
            .toks
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(format!("line ends before {what}")))?;
        self.pos += 1;
        Ok(t)
    }

    fn peek(&self) -> Option<&'a str> {
        self.toks.get(self.pos).copied()
    }

    fn int(&mut self, name: &str) -> Result<i64, DeckError> {
        let t = self.next(name)?;
        t.parse()
            .map_err(|_| self.error(format!("`{t}` is not an integer (for {name})")))
    }

    fn double(&mut self, name: &str) -> Result<f64, DeckError> {
        let t = self.next(name)?;
        t.parse()
            .map_err(|_| self.error(format!("`{t}` is not a number (for {name})")))
    }
}

impl LineDefinition {
    pub fn builder() -> LineDefinitionBuilder {
        LineDefinitionBuilder::default()
    }

    /// Parse a content line.
    pub fn read(&self, line: &str) -> Result<InputParameterContainer, DeckError> {
        let mut tokens = Tokens {
            line,
            expected: self,
            toks: line.split_whitespace().collect(),
            pos: 0,
        };
        let mut out = InputParameterContainer::new();
        for c in &self.required {
            read_component(c, &mut tokens, &mut out)?;
        }
        let mut seen = BTreeSet::new();
        while let Some(tok) = tokens.peek() {
            let Some(c) = self.optional.iter().find(|c| c.name == tok) else {
                return Err(tokens.error(format!("unexpected token `{tok}`")));
            };
            if !seen.insert(c.name.as_str()) {
                return Err(tokens.error(format!("`{tok}` given more than once")));
            }
            read_component(c, &mut tokens, &mut out)?;
        }
        for c in &self.optional {
            if !out.contains(&c.name) {
                if let Some(d) = &c.default {
                    out.insert(&c.name, d.clone());
                }
            }
        }
        Ok(out)
    }

    /// First token of the schema if it is a tag or named component.
    pub fn leading_name(&self) -> Option<&str> {
        self.required
            .first()
            .filter(|c| c.named || c.kind == Kind::Tag)
            .map(|c| c.name.as_str())
    }
}

impl fmt::Display for LineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .required
            .iter()
            .chain(&self.optional)
            .map(|c| c.to_string())
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

fn read_component(
    c: &Component,
    t: &mut Tokens<'_>,
    out: &mut InputParameterContainer,
) -> Result<(), DeckError> {
    if c.named || c.kind == Kind::Tag {
        let tok = t.next(&c.name)?;
        if tok != c.name {
            return Err(t.error(format!("expected `{}`, found `{tok}`", c.name)));
        }
    }
    let value = match &c.kind {
        Kind::Tag => ParamValue::Flag,
        Kind::Int => ParamValue::Int(t.int(&c.name)?),
        Kind::Double => ParamValue::Double(t.double(&c.name)?),
        Kind::Str => ParamValue::Str(t.next(&c.name)?.to_string()),
        Kind::IntVec(len) => {
            let n = vector_len(len, &c.name, t, out)?;
            ParamValue::IntVec((0..n).map(|_| t.int(&c.name)).collect::<Result<_, _>>()?)
        }
        Kind::DoubleVec(len) => {
            let n = vector_len(len, &c.name, t, out)?;
            ParamValue::DoubleVec((0..n).map(|_| t.double(&c.name)).collect::<Result<_, _>>()?)
        }
        Kind::StrVec(len) => {
            let n = vector_len(len, &c.name, t, out)?;
            ParamValue::StrVec(
                (0..n)
                    .map(|_| t.next(&c.name).map(str::to_string))
                    .collect::<Result<_, _>>()?,
            )
        }
    };
    out.insert(&c.name, value);
    Ok(())
}

fn vector_len(
    len: &VecLen,
    name: &str,
    t: &Tokens<'_>,
    out: &InputParameterContainer,
) -> Result<usize, DeckError> {
    match len {
        VecLen::Fixed(n) => Ok(*n),
        VecLen::From(key) => out
            .get_opt::<usize>(key)
            .ok_or_else(|| t.error(format!("length `{key}` of {name} not read before it"))),
    }
}

/// Read every content line of section `name`; each line must match one of
/// `defs` (first match wins).
pub fn read_all_lines_in_section<C: Communicator>(
    reader: &DeckReader<C>,
    name: &str,
    defs: &[LineDefinition],
) -> Result<Vec<InputParameterContainer>, DeckError> {
    let mut out = Vec::new();
    for line in reader.lines_in_section(name) {
        let line = line?;
        let mut first_err = None;
        let mut parsed = None;
        for def in defs {
            match def.read(&line) {
                Ok(c) => {
                    parsed = Some(c);
                    break;
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match (parsed, first_err) {
            (Some(c), _) => out.push(c),
            (None, Some(e)) => return Err(e),
            (None, None) => {
                return Err(DeckError::LineDefinition {
                    line: line.into_owned(),
                    expected: String::new(),
                    reason: format!("no line definitions for section `{name}`"),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn elchphase() -> LineDefinition {
        LineDefinition::builder()
            .add_named_int("MAT")
            .add_tag("MAT_elchphase")
            .add_named_double("EPSILON")
            .add_named_double("TORTUOSITY")
            .add_named_int("NUMMAT")
            .add_named_int_vector_from("MATIDS", "NUMMAT")
            .add_optional_named_string("KINEM")
            .with_default("nonlinear")
            .add_optional_tag("LOCAL")
            .build()
    }

    #[test]
    fn optional_components_in_any_order() {
        let def = elchphase();
        let a = def
            .read("MAT 3 MAT_elchphase EPSILON 1.0 TORTUOSITY 1 NUMMAT 2 MATIDS 4 5 LOCAL KINEM linear")
            .expect("all given");
        assert_eq!(a.get::<Vec<i32>>("MATIDS").expect("ids"), vec![4, 5]);
        assert_eq!(a.get::<String>("KINEM").expect("kinem"), "linear");
        assert!(a.has_flag("LOCAL"));

        let b = def
            .read("MAT 3 MAT_elchphase EPSILON 1.0 TORTUOSITY 1 NUMMAT 1 MATIDS 4")
            .expect("defaults");
        assert_eq!(b.get::<String>("KINEM").expect("default"), "nonlinear");
        assert!(!b.has_flag("LOCAL"));
        assert_eq!(b.get::<f64>("TORTUOSITY").expect("int as real"), 1.0);
    }

    #[test]
    fn errors_name_line_and_schema() {
        let def = elchphase();
        let err = def
            .read("MAT 3 MAT_elchphase EPSILON x TORTUOSITY 1 NUMMAT 1 MATIDS 4")
            .unwrap_err();
        match err {
            DeckError::LineDefinition { line, expected, reason } => {
                assert!(line.contains("EPSILON x"));
                assert!(expected.starts_with("MAT <int> MAT_elchphase EPSILON <double>"));
                assert!(expected.ends_with("[KINEM <string>] [LOCAL]"));
                assert!(reason.contains("`x`"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(def
            .read("MAT 3 MAT_elchphase EPSILON 1 TORTUOSITY 1 NUMMAT 1 MATIDS 4 LOCAL LOCAL")
            .is_err());
        assert!(def
            .read("MAT 3 MAT_elchphase EPSILON 1 TORTUOSITY 1 NUMMAT 2 MATIDS 4")
            .is_err());
        assert!(def
            .read("MAT 3 MAT_elchphase EPSILON 1 TORTUOSITY 1 NUMMAT 1 MATIDS 4 EXTRA")
            .is_err());
    }

    #[test]
    fn positional_components() {
        let def = LineDefinition::builder()
            .add_tag("NODE")
            .add_int("gid")
            .add_tag("COORD")
            .add_double_vector("coords", 3)
            .build();
        let c = def.read("NODE 12 COORD 0.5 -1 2e-3").expect("node");
        assert_eq!(c.get::<i64>("gid").expect("gid"), 12);
        assert_eq!(c.get::<Vec<f64>>("coords").expect("xyz"), vec![0.5, -1.0, 0.002]);
        assert_eq!(def.to_string(), "NODE <gid:int> COORD <coords:double>x3");
    }

    proptest! {
        #[test]
        fn named_double_reads_any_finite_value(x in -1.0e12f64..1.0e12) {
            let def = LineDefinition::builder().add_named_double("DENS").build();
            let c = def.read(&format!("DENS {x:e}")).expect("parse");
            prop_assert_eq!(c.get::<f64>("DENS").expect("value"), x);
        }

        #[test]
        fn leftover_tokens_are_rejected(extra in "[A-Z]{1,6}") {
            let def = LineDefinition::builder().add_named_int("MAT").build();
            let line = format!("MAT 1 {extra}");
            prop_assert!(def.read(&line).is_err());
        }
    }
}
