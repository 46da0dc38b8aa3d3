//! Conversion of raw directory entries into JSON records.

use crate::client::LdapEntry;
use crate::dn::DistinguishedName;
use crate::status::AccountStatus;
use crate::value::DirectoryValue;
use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Key under which the computed account status is stored in `attrs`.
pub const COMPUTED_STATUS_KEY: &str = "computed_status";

/// JSON-ready view of one entry: `{dn, attrs: {name: [values]}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEntry {
    /// Distinguished name.
    pub dn: String,
    /// Attribute values, timestamps rendered as RFC 3339 text.
    pub attrs: Map<String, Value>,
}

impl NormalizedEntry {
    /// Stores `status` under `computed_status`, replacing any attribute of that name.
    ///
    /// # Errors
    ///
    /// Returns [`dirkeeper_core::Error::SerializationError`] if the status cannot be encoded.
    pub fn attach_status(&mut self, status: &AccountStatus) -> Result<()> {
        let value = serde_json::to_value(status)?;
        self.attrs.insert(COMPUTED_STATUS_KEY.to_string(), value);
        Ok(())
    }

    /// First value of an attribute as text (case-insensitive name match).
    #[must_use]
    pub fn first_text(&self, attribute: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .and_then(|(_, value)| value.get(0))
            .and_then(Value::as_str)
    }
}

/// Normalizes one entry.
///
/// With a projection, only the listed attributes that exist on the entry are kept (names match
/// case-insensitively, missing ones are omitted). Without one, every attribute passes through.
/// The root DSE (empty DN) is accepted.
///
/// # Errors
///
/// Returns [`dirkeeper_core::Error::InvalidRequest`] if the entry DN does not parse.
pub fn normalize_entry(
    entry: &LdapEntry,
    projection: Option<&[String]>,
) -> Result<NormalizedEntry> {
    if !entry.dn.trim().is_empty() {
        DistinguishedName::parse(&entry.dn)?;
    }

    let selected: Vec<(&String, &Vec<String>)> = match projection {
        Some(wanted) => entry
            .attributes
            .iter()
            .filter(|(name, _)| wanted.iter().any(|w| w.eq_ignore_ascii_case(name)))
            .collect(),
        None => entry.attributes.iter().collect(),
    };

    let attrs = selected
        .into_iter()
        .map(|(name, values)| {
            let list = DirectoryValue::List(
                values
                    .iter()
                    .map(|raw| DirectoryValue::from_attribute(name, raw))
                    .collect(),
            );
            (name.clone(), list.to_json())
        })
        .collect::<Map<String, Value>>();

    Ok(NormalizedEntry {
        dn: entry.dn.clone(),
        attrs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SimpleStatus;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    fn entry(dn: &str, attributes: &[(&str, &str)]) -> LdapEntry {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in attributes {
            map.entry((*name).to_string())
                .or_default()
                .push((*value).to_string());
        }
        LdapEntry {
            dn: dn.to_string(),
            attributes: map,
        }
    }

    fn testuser() -> LdapEntry {
        entry(
            "uid=testuser1,ou=people,dc=test,dc=com",
            &[
                ("uid", "testuser1"),
                ("cn", "Test User 1"),
                ("mail", "testuser1@test.com"),
                ("createTimestamp", "20240131120000Z"),
                ("objectClass", "top"),
                ("objectClass", "inetOrgPerson"),
            ],
        )
    }

    #[test]
    fn passes_all_attributes_without_projection() {
        let normalized = normalize_entry(&testuser(), None).unwrap();
        assert_eq!(normalized.dn, "uid=testuser1,ou=people,dc=test,dc=com");
        assert_eq!(normalized.attrs.len(), 5);
        assert_eq!(normalized.attrs["uid"], json!(["testuser1"]));
        assert_eq!(normalized.attrs["objectClass"], json!(["top", "inetOrgPerson"]));
        assert_eq!(
            normalized.attrs["createTimestamp"],
            json!(["2024-01-31T12:00:00+00:00"])
        );
        assert_eq!(normalized.first_text("UID"), Some("testuser1"));
    }

    #[test]
    fn projection_keeps_only_existing_attributes() {
        let projection = vec!["UID".to_string(), "mail".to_string(), "telephoneNumber".to_string()];
        let normalized = normalize_entry(&testuser(), Some(projection.as_slice())).unwrap();
        let mut keys = normalized.attrs.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["mail", "uid"]);
        assert!(!normalized.attrs.values().any(Value::is_null));
    }

    #[test]
    fn status_overwrites_existing_key() {
        let mut normalized = normalize_entry(
            &entry(
                "uid=x,ou=people,dc=test,dc=com",
                &[("computed_status", "forged")],
            ),
            None,
        )
        .unwrap();
        let status = AccountStatus {
            simple_status: SimpleStatus::Locked,
            detailed_status: "DIRECTLY_LOCKED".to_string(),
            status_params: BTreeMap::new(),
            calc_time: None,
        };
        normalized.attach_status(&status).unwrap();
        assert_eq!(
            normalized.attrs[COMPUTED_STATUS_KEY]["simple_status"],
            json!("locked")
        );
    }

    #[test]
    fn attrs_only_entries_keep_empty_lists() {
        let mut raw = entry("uid=testuser1,ou=people,dc=test,dc=com", &[]);
        raw.attributes.insert("cn".to_string(), Vec::new());
        let normalized = normalize_entry(&raw, None).unwrap();
        assert_eq!(normalized.attrs["cn"], json!([]));
    }

    #[test]
    fn malformed_dn_is_rejected() {
        let err = normalize_entry(&entry("uid=broken,", &[("uid", "broken")]), None).unwrap_err();
        assert!(matches!(err, dirkeeper_core::Error::InvalidRequest(_)));
    }

    #[test]
    fn root_dse_is_accepted() {
        let normalized =
            normalize_entry(&entry("", &[("namingContexts", "dc=test,dc=com")]), None).unwrap();
        assert_eq!(normalized.dn, "");
    }
}
