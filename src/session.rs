// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Credential state for sessions with a provider's control panel.
//!
//! A [`ZoneDirectory`](crate::reconcile::ZoneDirectory) or
//! [`SlaveRegistrar`](crate::coordinator::SlaveRegistrar) that logs in
//! to a web interface needs to keep its session cookies between runs.
//! Rather than a process-wide cookie store, the cookies live in a
//! [`CookieJar`] that is loaded from a [`CredentialCache`] and stored
//! back when the session ends; see [`with_session`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use log::warn;

////////////////////////////////////////////////////////////////////////
// COOKIE JARS                                                        //
////////////////////////////////////////////////////////////////////////

/// A set of cookies, keyed by name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the cookie `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Sets a cookie, returning its previous value.
    ///
    /// Cookie names may not be empty or contain `=`, and neither names
    /// nor values may contain line breaks.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>, CacheError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() || name.contains(['=', '\n', '\r']) || value.contains(['\n', '\r']) {
            return Err(CacheError::InvalidCookie(name));
        }
        Ok(self.cookies.insert(name, value))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// CACHES                                                             //
////////////////////////////////////////////////////////////////////////

/// Trait for persistent storage of a [`CookieJar`].
pub trait CredentialCache {
    /// Loads the stored jar. A cache with nothing stored yet yields an
    /// empty jar.
    fn load(&mut self) -> Result<CookieJar, CacheError>;

    /// Replaces the stored jar with `jar`.
    fn store(&mut self, jar: &CookieJar) -> Result<(), CacheError>;
}

////////////////////////////////////////////////////////////////////////
// SESSIONS                                                           //
////////////////////////////////////////////////////////////////////////

/// Runs `f` with the jar loaded from `cache`, storing the jar back
/// afterwards.
///
/// The jar is stored even when `f` fails, so that cookies obtained
/// before the failure (a fresh login, say) are not lost. In that case a
/// failure to store is logged and the error from `f` is returned.
pub fn with_session<C, F, T, E>(cache: &mut C, f: F) -> Result<T, SessionError<E>>
where
    C: CredentialCache + ?Sized,
    F: FnOnce(&mut CookieJar) -> Result<T, E>,
{
    let mut jar = cache.load().map_err(SessionError::Load)?;
    let result = f(&mut jar);
    let stored = cache.store(&jar);
    match (result, stored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(SessionError::Store(e)),
        (Err(e), Ok(())) => Err(SessionError::Session(e)),
        (Err(e), Err(store_error)) => {
            warn!("failed to store credentials after a failed session: {store_error}");
            Err(SessionError::Session(e))
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error from a [`CredentialCache`].
#[derive(Debug)]
pub enum CacheError {
    Io(io::Error),
    InvalidCookie(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(_) => f.write_str("failed to access the credential cache"),
            Self::InvalidCookie(name) => write!(f, "cookie {:?} cannot be cached", name),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidCookie(_) => None,
        }
    }
}

/// An error from [`with_session`].
#[derive(Debug)]
pub enum SessionError<E> {
    /// The jar could not be loaded, so the session never ran.
    Load(CacheError),

    /// The session itself failed.
    Session(E),

    /// The session succeeded, but the jar could not be stored.
    Store(CacheError),
}

impl<E: fmt::Display> fmt::Display for SessionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Load(_) => f.write_str("failed to load credentials"),
            Self::Session(e) => e.fmt(f),
            Self::Store(_) => f.write_str("failed to store credentials"),
        }
    }
}

impl<E> std::error::Error for SessionError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) | Self::Store(e) => Some(e),
            Self::Session(e) => e.source(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryCache {
        jar: CookieJar,
        stores: usize,
        fail_store: bool,
    }

    impl CredentialCache for MemoryCache {
        fn load(&mut self) -> Result<CookieJar, CacheError> {
            Ok(self.jar.clone())
        }

        fn store(&mut self, jar: &CookieJar) -> Result<(), CacheError> {
            self.stores += 1;
            if self.fail_store {
                return Err(CacheError::Io(io::Error::new(io::ErrorKind::Other, "full")));
            }
            self.jar = jar.clone();
            Ok(())
        }
    }

    #[test]
    fn jar_validates_cookies() {
        let mut jar = CookieJar::new();
        assert!(jar.set("a=b", "c").is_err());
        assert!(jar.set("", "c").is_err());
        assert!(jar.set("a", "multi\nline").is_err());
        assert_eq!(jar.set("a", "1").unwrap(), None);
        assert_eq!(jar.set("a", "2").unwrap(), Some("1".to_owned()));
        assert_eq!(jar.get("a"), Some("2"));
        assert!(!jar.is_empty());
    }

    #[test]
    fn sessions_store_the_jar_on_success_and_failure() {
        let mut cache = MemoryCache::default();
        let value = with_session(&mut cache, |jar| {
            jar.set("session", "one").map(|_| 42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(cache.jar.get("session"), Some("one"));

        let result: Result<(), SessionError<&str>> = with_session(&mut cache, |jar| {
            jar.set("session", "two").map_err(|_| "unexpected")?;
            Err("scrape failed")
        });
        assert!(matches!(result, Err(SessionError::Session("scrape failed"))));
        assert_eq!(cache.jar.get("session"), Some("two"));
        assert_eq!(cache.stores, 2);
    }

    #[test]
    fn store_failures_are_reported_only_after_success() {
        let mut cache = MemoryCache {
            fail_store: true,
            ..Default::default()
        };
        let ok: Result<(), SessionError<&str>> = with_session(&mut cache, |_| Ok(()));
        assert!(matches!(ok, Err(SessionError::Store(_))));
        let failed: Result<(), SessionError<&str>> = with_session(&mut cache, |_| Err("boom"));
        assert!(matches!(failed, Err(SessionError::Session("boom"))));
    }
}
