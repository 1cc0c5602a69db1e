//! Typed LDAP search filters

use keyway_core::types::DirectoryIdentity;
use keyway_core::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Active Directory LDAP_MATCHING_RULE_BIT_AND
pub const BIT_AND_RULE: &str = "1.2.840.113556.1.4.803";
/// Active Directory LDAP_MATCHING_RULE_BIT_OR
pub const BIT_OR_RULE: &str = "1.2.840.113556.1.4.804";

/// Search filter, covering every RFC 4515 item type.
///
/// The LDAP client sends the rendered form. In-memory directories evaluate
/// the same value with [`Filter::matches`], which approximates ordering,
/// approximate and extensible matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals {
        attribute: String,
        value: String,
    },
    Present(String),
    /// `(attr=initial*any*...*last)`
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
    GreaterOrEqual {
        attribute: String,
        value: String,
    },
    LessOrEqual {
        attribute: String,
        value: String,
    },
    Approx {
        attribute: String,
        value: String,
    },
    /// `(attr:dn:rule:=value)`; at least one of attribute and rule is set
    Extensible {
        attribute: Option<String>,
        dn_attributes: bool,
        rule: Option<String>,
        value: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(attribute: &str, value: &str) -> Self {
        Filter::Equals {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn present(attribute: &str) -> Self {
        Filter::Present(attribute.to_string())
    }

    /// AND the filters together; a single filter is returned unwrapped
    pub fn all(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::And(filters)
        }
    }

    /// Parse a filter in RFC 4515 string form, e.g. `(&(objectClass=person)(!(ou=ex)))`
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input: input.trim(),
            pos: 0,
        };
        let filter = parser.filter()?;

        if parser.pos != parser.input.len() {
            return Err(parser.error("unexpected trailing input"));
        }

        Ok(filter)
    }

    /// Evaluate against an entry. Attribute names and values compare
    /// case-insensitively; ordering compares numerically when both sides are
    /// integers. Extensible matches understand only the Active Directory
    /// bitwise rules and rule-less equality.
    pub fn matches(&self, identity: &DirectoryIdentity) -> bool {
        match self {
            Filter::Equals { attribute, value } | Filter::Approx { attribute, value } => identity
                .get_values(attribute)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::Present(attribute) => !identity.get_values(attribute).is_empty(),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => identity
                .get_values(attribute)
                .iter()
                .any(|v| substring_matches(v, initial.as_deref(), any, last.as_deref())),
            Filter::GreaterOrEqual { attribute, value } => identity
                .get_values(attribute)
                .iter()
                .any(|v| compare(v, value) != Ordering::Less),
            Filter::LessOrEqual { attribute, value } => identity
                .get_values(attribute)
                .iter()
                .any(|v| compare(v, value) != Ordering::Greater),
            Filter::Extensible {
                attribute: Some(attribute),
                dn_attributes,
                rule,
                value,
            } => {
                let mut values: Vec<&str> = identity
                    .get_values(attribute)
                    .iter()
                    .map(String::as_str)
                    .collect();
                if *dn_attributes {
                    values.extend(dn_values(&identity.dn, attribute));
                }
                values
                    .into_iter()
                    .any(|v| extensible_matches(rule.as_deref(), v, value))
            }
            Filter::Extensible { attribute: None, .. } => false,
            Filter::And(filters) => filters.iter().all(|f| f.matches(identity)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(identity)),
            Filter::Not(filter) => !filter.matches(identity),
        }
    }
}

fn substring_matches(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();

    if let Some(initial) = initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }

    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }

    last.map_or(true, |last| rest.ends_with(last.to_lowercase().as_str()))
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<i64>(), right.trim().parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

fn extensible_matches(rule: Option<&str>, candidate: &str, value: &str) -> bool {
    let bits = || -> Option<(i64, i64)> {
        let candidate = candidate.trim().parse::<i64>().ok()?;
        let mask = value.trim().parse::<i64>().ok()?;
        Some((candidate, mask))
    };

    match rule {
        None => candidate.eq_ignore_ascii_case(value),
        Some(BIT_AND_RULE) => bits().is_some_and(|(c, m)| c & m == m),
        Some(BIT_OR_RULE) => bits().is_some_and(|(c, m)| c & m != 0),
        Some(_) => false,
    }
}

/// Values of `attribute` among the RDN components of a DN
fn dn_values<'a>(dn: &'a str, attribute: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    dn.split(',')
        .filter_map(|rdn| rdn.split_once('='))
        .filter(move |(name, _)| name.trim().eq_ignore_ascii_case(attribute))
        .map(|(_, value)| value.trim())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", attribute, ldap3::ldap_escape(value.as_str()))
            }
            Filter::Present(attribute) => write!(f, "({}=*)", attribute),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attribute)?;
                if let Some(initial) = initial {
                    f.write_str(&ldap3::ldap_escape(initial.as_str()))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", ldap3::ldap_escape(part.as_str()))?;
                }
                if let Some(last) = last {
                    f.write_str(&ldap3::ldap_escape(last.as_str()))?;
                }
                f.write_str(")")
            }
            Filter::GreaterOrEqual { attribute, value } => {
                write!(f, "({}>={})", attribute, ldap3::ldap_escape(value.as_str()))
            }
            Filter::LessOrEqual { attribute, value } => {
                write!(f, "({}<={})", attribute, ldap3::ldap_escape(value.as_str()))
            }
            Filter::Approx { attribute, value } => {
                write!(f, "({}~={})", attribute, ldap3::ldap_escape(value.as_str()))
            }
            Filter::Extensible {
                attribute,
                dn_attributes,
                rule,
                value,
            } => {
                f.write_str("(")?;
                if let Some(attribute) = attribute {
                    f.write_str(attribute)?;
                }
                if *dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":={})", ldap3::ldap_escape(value.as_str()))
            }
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::InvalidFilter(format!("{} at offset {} in {}", message, self.pos, self.input))
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect(b'(')?;

        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };

        self.expect(b')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }

        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }

        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(')')
            .ok_or_else(|| self.error("unterminated filter item"))?;
        let item = &rest[..end];

        let (lhs, value) = item
            .split_once('=')
            .ok_or_else(|| self.error("filter item has no '='"))?;

        let filter = if let Some(attribute) = lhs.strip_suffix('>') {
            Filter::GreaterOrEqual {
                attribute: self.attribute(attribute)?,
                value: self.assertion(value)?,
            }
        } else if let Some(attribute) = lhs.strip_suffix('<') {
            Filter::LessOrEqual {
                attribute: self.attribute(attribute)?,
                value: self.assertion(value)?,
            }
        } else if let Some(attribute) = lhs.strip_suffix('~') {
            Filter::Approx {
                attribute: self.attribute(attribute)?,
                value: self.assertion(value)?,
            }
        } else if let Some(description) = lhs.strip_suffix(':') {
            self.extensible(description, value)?
        } else if value == "*" {
            Filter::Present(self.attribute(lhs)?)
        } else if value.contains('*') {
            self.substring(lhs, value)?
        } else {
            Filter::Equals {
                attribute: self.attribute(lhs)?,
                value: self.unescape(value)?,
            }
        };

        self.pos += end;
        Ok(filter)
    }

    fn attribute(&self, name: &str) -> Result<String> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')
        {
            return Err(self.error("invalid attribute description"));
        }
        Ok(name.to_string())
    }

    /// A single value; `*` is only meaningful in equality items
    fn assertion(&self, value: &str) -> Result<String> {
        if value.contains('*') {
            return Err(self.error("unescaped '*' in assertion value"));
        }
        self.unescape(value)
    }

    fn substring(&self, attribute: &str, value: &str) -> Result<Filter> {
        let mut parts: Vec<&str> = value.split('*').collect();
        // split on at least one '*' yields at least two parts
        let last = parts.pop().unwrap_or_default();
        let initial = parts.remove(0);

        let optional = |part: &str| -> Result<Option<String>> {
            if part.is_empty() {
                Ok(None)
            } else {
                self.unescape(part).map(Some)
            }
        };

        Ok(Filter::Substring {
            attribute: self.attribute(attribute)?,
            initial: optional(initial)?,
            any: parts
                .into_iter()
                .filter(|part| !part.is_empty())
                .map(|part| self.unescape(part))
                .collect::<Result<_>>()?,
            last: optional(last)?,
        })
    }

    /// `attr[:dn][:rule]` or `[:dn]:rule`, without the trailing ':'
    fn extensible(&self, description: &str, value: &str) -> Result<Filter> {
        let mut parts = description.split(':');
        let attribute = match parts.next() {
            Some("") | None => None,
            Some(name) => Some(self.attribute(name)?),
        };

        let mut dn_attributes = false;
        let mut rule = None;
        for (index, part) in parts.enumerate() {
            if index == 0 && part.eq_ignore_ascii_case("dn") {
                dn_attributes = true;
            } else if rule.is_none() {
                rule = Some(self.attribute(part)?);
            } else {
                return Err(self.error("invalid extensible match"));
            }
        }

        if attribute.is_none() && rule.is_none() {
            return Err(self.error("extensible match needs an attribute or a matching rule"));
        }

        Ok(Filter::Extensible {
            attribute,
            dn_attributes,
            rule,
            value: self.assertion(value)?,
        })
    }

    fn unescape(&self, value: &str) -> Result<String> {
        let bytes = value.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'\\' {
                let hex = value
                    .get(i + 1..i + 3)
                    .ok_or_else(|| self.error("truncated escape sequence"))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| self.error("invalid escape sequence"))?;
                out.push(byte);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }

        String::from_utf8(out).map_err(|_| self.error("escaped value is not UTF-8"))
    }
}
