//! Realm and `return_to` validation
//!
//! A relying party declares a realm (optionally with a `*.` wildcard host)
//! and must send the assertion back to a `return_to` URL inside it. Without
//! this check a broad realm could be used to bounce assertions to an
//! arbitrary host.

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealmError {
    #[error("checkid_setup/checkid_immediate must specify one (or both) of return_to and realm")]
    MissingTarget,

    #[error("Invalid realm")]
    InvalidRealm,

    #[error("Realm cannot contain a fragment")]
    Fragment,

    #[error("The return_to URL does not match the realm")]
    Mismatch,
}

/// A parsed realm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    url: Url,
    wildcard: bool,
}

impl Realm {
    /// Parse a realm, accepting a leading `*.` label in the host
    pub fn parse(realm: &str) -> Result<Self, RealmError> {
        let (concrete, wildcard) = strip_wildcard(realm);

        let url = Url::parse(&concrete).map_err(|_| RealmError::InvalidRealm)?;
        if url.fragment().is_some() {
            return Err(RealmError::Fragment);
        }
        if !is_web_url(&url) {
            return Err(RealmError::InvalidRealm);
        }

        Ok(Self { url, wildcard })
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Realm host with any wildcard removed
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Check that `return_to` falls inside this realm
    pub fn matches(&self, return_to: &Url) -> bool {
        if self.url.scheme() != return_to.scheme()
            || self.url.port_or_known_default() != return_to.port_or_known_default()
        {
            return false;
        }

        let realm_path = self.url.path();
        let path = return_to.path();
        let sub_path_prefix = format!("{}/", realm_path.trim_end_matches('/'));
        if path != realm_path && !path.starts_with(&sub_path_prefix) {
            return false;
        }

        let host = return_to.host_str().unwrap_or_default();
        if self.wildcard {
            // Strict subdomains only; the bare domain does not match.
            host.ends_with(&format!(".{}", self.host()))
        } else {
            host == self.host()
        }
    }
}

/// Validate the realm / return_to pair of a checkid request
pub fn validate(realm: Option<&str>, return_to: Option<&str>) -> Result<(), RealmError> {
    if realm.is_none() && return_to.is_none() {
        return Err(RealmError::MissingTarget);
    }

    let Some(realm) = realm else {
        return Ok(());
    };
    let realm = Realm::parse(realm)?;

    if let Some(return_to) = return_to {
        let return_to = Url::parse(return_to).map_err(|_| RealmError::Mismatch)?;
        if !realm.matches(&return_to) {
            return Err(RealmError::Mismatch);
        }
    }

    Ok(())
}

/// http or https with a non-empty host
pub fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}

/// Remove a `*.` prefix from the host part of the authority
fn strip_wildcard(realm: &str) -> (String, bool) {
    let Some(scheme_end) = realm.find("://") else {
        return (realm.to_string(), false);
    };
    let authority_start = scheme_end + 3;
    let rest = &realm[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];
    let host_offset = authority.rfind('@').map(|i| i + 1).unwrap_or(0);

    if authority[host_offset..].starts_with("*.") {
        let at = authority_start + host_offset;
        (format!("{}{}", &realm[..at], &realm[at + 2..]), true)
    } else {
        (realm.to_string(), false)
    }
}
