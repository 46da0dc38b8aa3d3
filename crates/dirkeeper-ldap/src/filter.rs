//! Search filter construction.
//!
//! Filters are built as RFC 4515 strings from high-level intents. Caller-supplied values are
//! escaped so they cannot change the structure of the filter; `*` is kept as the wildcard token
//! except where noted.

use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::status::SimpleStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attributes consulted by name and term searches.
pub const SEARCHABLE_ATTRIBUTES: &[&str] = &["uid", "cn", "sn", "givenName", "mail", "displayName"];

/// Selects entries that represent people.
pub const USER_OBJECT_FILTER: &str = "(|(objectClass=person)(objectClass=nsAccount))";

/// Selects group entries.
pub const GROUP_OBJECT_FILTER: &str =
    "(|(objectClass=groupOfNames)(objectClass=groupOfUniqueNames)(objectClass=posixGroup))";

/// Matching mode of a name search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// `(attr=value)`
    Exact,
    /// `(attr=*value*)`
    #[default]
    Wildcard,
    /// `(attr=value*)` and `(attr=*value*)`
    Fuzzy,
}

impl SearchMode {
    /// Parses a mode name. Unknown names select [`SearchMode::Wildcard`].
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Lower-case mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Wildcard => "wildcard",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "wildcard" => Ok(Self::Wildcard),
            "fuzzy" => Ok(Self::Fuzzy),
            _ => Err(()),
        }
    }
}

/// Structured criteria of an advanced search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvancedFilters {
    /// Groups the user must belong to (all of them). Short names or full DNs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_membership: Vec<String>,
    /// Attribute → substring the attribute must contain.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_contains: BTreeMap<String, String>,
    /// Attributes that must be present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has_attribute: Vec<String>,
    /// Require (`true`) or forbid (`false`) a recorded last login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_last_login: Option<bool>,
    /// Status the computed account status must equal. Applied after the search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SimpleStatus>,
    /// Raw filter clause ANDed with the other criteria.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_filter: Option<String>,
}

/// Escapes a value for use inside a filter, keeping `*` as a wildcard.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    escape(value, false)
}

/// Escapes a value for an exact match; `*` is escaped too.
#[must_use]
pub fn escape_filter_value_strict(value: &str) -> String {
    escape(value, true)
}

fn escape(value: &str, escape_star: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            '*' if escape_star => escaped.push_str("\\2a"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Returns true if `name` is a syntactically valid attribute description.
#[must_use]
pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first.is_ascii_digit() {
        // numeric OID
        return name
            .split('.')
            .all(|arc| !arc.is_empty() && arc.chars().all(|c| c.is_ascii_digit()));
    }
    first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
}

/// AND-combines clauses; a single clause passes through unchanged.
#[must_use]
pub fn and_all(clauses: &[String]) -> Option<String> {
    combine('&', clauses)
}

/// OR-combines clauses; a single clause passes through unchanged.
#[must_use]
pub fn or_all(clauses: &[String]) -> Option<String> {
    combine('|', clauses)
}

fn combine(operator: char, clauses: &[String]) -> Option<String> {
    match clauses {
        [] => None,
        [single] => Some(single.clone()),
        many => Some(format!("({operator}{})", many.concat())),
    }
}

/// Builds the OR of per-attribute predicates over [`SEARCHABLE_ATTRIBUTES`].
///
/// A term that already contains `*` is used verbatim in every mode.
#[must_use]
pub fn name_search_filter(term: &str, mode: SearchMode) -> String {
    let value = escape_filter_value(term.trim());
    let verbatim = value.contains('*');

    let clauses = SEARCHABLE_ATTRIBUTES
        .iter()
        .flat_map(|attr| {
            if verbatim {
                return vec![format!("({attr}={value})")];
            }
            match mode {
                SearchMode::Exact => vec![format!("({attr}={value})")],
                SearchMode::Wildcard => vec![format!("({attr}=*{value}*)")],
                SearchMode::Fuzzy => vec![
                    format!("({attr}={value}*)"),
                    format!("({attr}=*{value}*)"),
                ],
            }
        })
        .collect::<Vec<_>>();

    or_all(&clauses).unwrap_or_default()
}

/// Builds a single-attribute predicate: verbatim if the value has a `*`, else `*value*`.
#[must_use]
pub fn attribute_search_filter(attribute: &str, value: &str) -> String {
    let escaped = escape_filter_value(value);
    if escaped.contains('*') {
        format!("({attribute}={escaped})")
    } else {
        format!("({attribute}=*{escaped}*)")
    }
}

/// Resolves a group reference to a DN: `cn=`-prefixed values are taken as DNs, anything else is
/// the `cn` of a group under `group_base_dn`.
#[must_use]
pub fn group_dn(group: &str, group_base_dn: &str) -> String {
    let group = group.trim();
    if group.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("cn=")) {
        return group.to_string();
    }
    match DistinguishedName::parse(group_base_dn) {
        Ok(base) => base
            .with_prefix(RelativeDistinguishedName::new("cn", group))
            .to_string(),
        Err(_) => format!("cn={group},{group_base_dn}"),
    }
}

/// Compiles the structured criteria into a filter. Returns `None` when no criterion contributes a
/// clause. The status criterion never does.
#[must_use]
pub fn advanced_filter(criteria: &AdvancedFilters, group_base_dn: &str) -> Option<String> {
    let mut clauses = Vec::new();

    clauses.extend(criteria.group_membership.iter().filter(|g| !g.trim().is_empty()).map(|group| {
        format!(
            "(memberOf={})",
            escape_filter_value_strict(&group_dn(group, group_base_dn))
        )
    }));

    clauses.extend(
        criteria
            .attribute_contains
            .iter()
            .filter(|(attr, _)| is_valid_attribute_name(attr))
            .map(|(attr, value)| attribute_search_filter(attr, value)),
    );

    clauses.extend(
        criteria
            .has_attribute
            .iter()
            .filter(|attr| is_valid_attribute_name(attr))
            .map(|attr| format!("({attr}=*)")),
    );

    match criteria.has_last_login {
        Some(true) => clauses.push("(lastLoginTime=*)".to_string()),
        Some(false) => clauses.push("(!(lastLoginTime=*))".to_string()),
        None => {}
    }

    if let Some(custom) = criteria.custom_filter.as_deref().map(str::trim) {
        if !custom.is_empty() {
            clauses.push(custom.to_string());
        }
    }

    and_all(&clauses)
}

/// Combines the optional term and advanced sub-filters of an advanced search.
#[must_use]
pub fn combine_search(term: Option<String>, advanced: Option<String>) -> Option<String> {
    match (term, advanced) {
        (Some(term), Some(advanced)) => Some(format!("(&{term}{advanced})")),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    }
}

/// Restricts `filter` to entries matching `object_filter`.
#[must_use]
pub fn scoped(object_filter: &str, filter: Option<&str>) -> String {
    match filter {
        Some(filter) => format!("(&{object_filter}{filter})"),
        None => object_filter.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_search_modes() {
        assert_eq!(
            name_search_filter("jdoe", SearchMode::Exact),
            "(|(uid=jdoe)(cn=jdoe)(sn=jdoe)(givenName=jdoe)(mail=jdoe)(displayName=jdoe))"
        );
        assert_eq!(
            name_search_filter("jdoe", SearchMode::Wildcard),
            concat!(
                "(|(uid=*jdoe*)(cn=*jdoe*)(sn=*jdoe*)",
                "(givenName=*jdoe*)(mail=*jdoe*)(displayName=*jdoe*))"
            )
        );

        let fuzzy = name_search_filter("jdoe", SearchMode::Fuzzy);
        assert!(fuzzy.starts_with("(|(uid=jdoe*)(uid=*jdoe*)(cn=jdoe*)"));
        assert_eq!(fuzzy.matches("=jdoe*)").count(), 6);
        assert_eq!(fuzzy.matches("=*jdoe*)").count(), 6);
    }

    #[test]
    fn unknown_mode_is_wildcard() {
        assert_eq!(SearchMode::parse_lenient("phonetic"), SearchMode::Wildcard);
        assert_eq!(SearchMode::parse_lenient("FUZZY"), SearchMode::Fuzzy);
        assert_eq!(
            name_search_filter("x", SearchMode::parse_lenient("nope")),
            name_search_filter("x", SearchMode::Wildcard)
        );
    }

    #[test]
    fn name_with_star_is_not_wrapped() {
        for mode in [SearchMode::Exact, SearchMode::Wildcard, SearchMode::Fuzzy] {
            let filter = name_search_filter("test*", mode);
            assert!(filter.contains("(uid=test*)"));
            assert!(!filter.contains("*test*"));
            assert!(!filter.contains("test**"));
        }
    }

    #[test]
    fn attribute_search_wraps_unless_wildcard_present() {
        assert_eq!(
            attribute_search_filter("employeeType", "Contractor"),
            "(employeeType=*Contractor*)"
        );
        assert_eq!(
            attribute_search_filter("employeeType", "Contr*"),
            "(employeeType=Contr*)"
        );
    }

    #[test]
    fn values_are_escaped() {
        assert_eq!(escape_filter_value("a(b)c\\*"), "a\\28b\\29c\\5c*");
        assert_eq!(escape_filter_value_strict("a*"), "a\\2a");
        assert_eq!(
            attribute_search_filter("cn", "x)(uid=*"),
            "(cn=x\\29\\28uid=*)"
        );
    }

    #[test]
    fn attribute_names() {
        assert!(is_valid_attribute_name("employeeType"));
        assert!(is_valid_attribute_name("userCertificate;binary"));
        assert!(is_valid_attribute_name("2.5.4.3"));
        assert!(!is_valid_attribute_name(""));
        assert!(!is_valid_attribute_name("cn)(uid"));
        assert!(!is_valid_attribute_name("2.5..3"));
    }

    #[test]
    fn groups_are_and_combined() {
        let criteria = AdvancedFilters {
            group_membership: vec!["g1".to_string(), "g2".to_string()],
            ..AdvancedFilters::default()
        };
        assert_eq!(
            advanced_filter(&criteria, "ou=groups,dc=test,dc=com").unwrap(),
            "(&(memberOf=cn=g1,ou=groups,dc=test,dc=com)(memberOf=cn=g2,ou=groups,dc=test,dc=com))"
        );
    }

    #[test]
    fn group_dns_pass_through() {
        assert_eq!(
            group_dn("CN=admins,ou=teams,dc=test,dc=com", "ou=groups,dc=test,dc=com"),
            "CN=admins,ou=teams,dc=test,dc=com"
        );
        assert_eq!(
            group_dn("testgroup1", "ou=groups,dc=test,dc=com"),
            "cn=testgroup1,ou=groups,dc=test,dc=com"
        );
    }

    #[test]
    fn advanced_criteria_compile() {
        let criteria = AdvancedFilters {
            attribute_contains: BTreeMap::from([("mail".to_string(), "@test.com".to_string())]),
            has_attribute: vec!["telephoneNumber".to_string(), "bad)(attr".to_string()],
            has_last_login: Some(false),
            status: Some(SimpleStatus::Locked),
            custom_filter: Some("(employeeType=Contractor)".to_string()),
            ..AdvancedFilters::default()
        };
        assert_eq!(
            advanced_filter(&criteria, "ou=groups,dc=test,dc=com").unwrap(),
            "(&(mail=*@test.com*)(telephoneNumber=*)(!(lastLoginTime=*))(employeeType=Contractor))"
        );
    }

    #[test]
    fn status_alone_compiles_to_nothing() {
        let criteria = AdvancedFilters {
            status: Some(SimpleStatus::Active),
            ..AdvancedFilters::default()
        };
        assert_eq!(advanced_filter(&criteria, "ou=groups,dc=test,dc=com"), None);

        let single = AdvancedFilters {
            has_last_login: Some(true),
            ..AdvancedFilters::default()
        };
        assert_eq!(
            advanced_filter(&single, "ou=groups,dc=test,dc=com").as_deref(),
            Some("(lastLoginTime=*)")
        );
    }

    #[test]
    fn search_combination() {
        let term = Some("(uid=a)".to_string());
        let adv = Some("(mail=*)".to_string());
        assert_eq!(
            combine_search(term.clone(), adv.clone()).as_deref(),
            Some("(&(uid=a)(mail=*))")
        );
        assert_eq!(combine_search(term, None).as_deref(), Some("(uid=a)"));
        assert_eq!(combine_search(None, adv).as_deref(), Some("(mail=*)"));
        assert_eq!(combine_search(None, None), None);

        assert_eq!(scoped(USER_OBJECT_FILTER, None), USER_OBJECT_FILTER);
        assert_eq!(
            scoped("(objectClass=person)", Some("(uid=a)")),
            "(&(objectClass=person)(uid=a))"
        );
    }
}
