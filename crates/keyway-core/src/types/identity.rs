//! Directory identity types

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// A directory entry resolved for a username.
///
/// Lives only for the duration of one authentication attempt. Attribute
/// names are stored lowercased since LDAP compares them case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryIdentity {
    /// Distinguished name
    pub dn: String,

    #[serde(default, deserialize_with = "normalized")]
    attributes: HashMap<String, Vec<String>>,
}

fn normalized<'de, D>(deserializer: D) -> Result<HashMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, Vec<String>>::deserialize(deserializer)?;
    Ok(fold_case(raw))
}

/// Lowercase attribute names. Values of names differing only by case are
/// concatenated in the byte order of the original names.
fn fold_case(raw: HashMap<String, Vec<String>>) -> HashMap<String, Vec<String>> {
    let mut entries: Vec<_> = raw.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut attributes: HashMap<String, Vec<String>> = HashMap::with_capacity(entries.len());
    for (name, values) in entries {
        attributes
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values);
    }
    attributes
}

impl DirectoryIdentity {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Build an identity from a raw directory entry
    pub fn from_attributes(dn: impl Into<String>, attributes: HashMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes: fold_case(attributes),
        }
    }

    /// Set an attribute, replacing any values stored under the same name
    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            name.to_ascii_lowercase(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Attributes keyed by lowercased name
    pub fn attributes(&self) -> &HashMap<String, Vec<String>> {
        &self.attributes
    }

    /// All values of an attribute. Attribute names compare case-insensitively.
    pub fn get_values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get first value of an attribute
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.get_values(name).first().map(|s| s.as_str())
    }

    /// First value that is not blank
    pub fn first_non_empty(&self, name: &str) -> Option<&str> {
        self.get_values(name)
            .iter()
            .map(|s| s.as_str())
            .find(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let identity = DirectoryIdentity::new("cn=alice,dc=corp")
            .with_attribute("memberOf", ["cn=staff,dc=corp", "cn=ops,dc=corp"]);

        assert_eq!(identity.get_values("memberof").len(), 2);
        assert_eq!(identity.get_attribute("MEMBEROF"), Some("cn=staff,dc=corp"));
        assert!(identity.get_values("mail").is_empty());
    }

    #[test]
    fn test_first_non_empty_skips_blanks() {
        let identity =
            DirectoryIdentity::new("cn=alice,dc=corp").with_attribute("mail", ["", "alice@corp"]);

        assert_eq!(identity.get_attribute("mail"), Some(""));
        assert_eq!(identity.first_non_empty("mail"), Some("alice@corp"));
    }

    #[test]
    fn test_case_duplicate_names_merge_in_stable_order() {
        let raw = HashMap::from([
            ("mail".to_string(), vec!["lower@corp".to_string()]),
            ("MAIL".to_string(), vec!["upper@corp".to_string()]),
            ("Mail".to_string(), vec!["title@corp".to_string()]),
        ]);

        for _ in 0..8 {
            let identity = DirectoryIdentity::from_attributes("cn=alice,dc=corp", raw.clone());
            assert_eq!(
                identity.get_values("mail"),
                ["upper@corp", "title@corp", "lower@corp"]
            );
            assert_eq!(identity.attributes().len(), 1);
        }
    }

    #[test]
    fn test_deserialized_names_are_folded() {
        let identity: DirectoryIdentity = serde_json::from_str(
            r#"{"dn":"cn=alice,dc=corp","attributes":{"displayName":["Alice"]}}"#,
        )
        .unwrap();

        assert_eq!(identity.attributes().keys().collect::<Vec<_>>(), ["displayname"]);
        assert_eq!(identity.get_attribute("DISPLAYNAME"), Some("Alice"));
    }
}
