//! The request descriptor the dispatch stack rewrites.
//!
//! The kernel never parses bytes; a transport adapter builds a [`Request`]
//! and hands it in. The stack only touches the URL (prefix stripping and
//! restoration) and the preserved original URL — method, headers, and
//! extensions ride along for the handlers' benefit.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A case-insensitive header map, preserving insertion order.
///
/// # Examples
///
/// ```
/// use lamina::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("X-Request-Id", "abc123");
/// assert_eq!(headers.get("x-request-id"), Some("abc123"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header entry; repeated names are kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Iterates over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Type-erased per-request state shared across layers.
///
/// Lets one layer stash a value (an authenticated principal, a deadline, a
/// trace id) for later layers to pick up without the layers knowing about
/// each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Creates an empty extension map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Borrows the stored value of type `T`, if any.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrows the stored value of type `T`, if any.
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Removes and returns the stored value of type `T`, if any.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// The request descriptor walked by a [`Stack`](crate::stack::Stack).
///
/// The URL is mutable because the stack rewrites it — a matched prefix is
/// stripped for the duration of a layer's handler and restored afterwards.
/// [`original_url`](Self::original_url) always reports the URL as first seen.
#[derive(Debug)]
pub struct Request {
    method: String,
    url: String,
    original_url: Option<String>,
    headers: Headers,
    extensions: Extensions,
}

impl Request {
    /// Creates a request descriptor from a method and URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use lamina::Request;
    ///
    /// let req = Request::new("GET", "/api/users?page=2");
    /// assert_eq!(req.method(), "GET");
    /// assert_eq!(req.url(), "/api/users?page=2");
    /// assert_eq!(req.path(), "/api/users");
    /// ```
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            original_url: None,
            headers: Headers::new(),
            extensions: Extensions::new(),
        }
    }

    /// Returns the request method. Opaque to the kernel.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the current (possibly rewritten) URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replaces the current URL.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Returns the URL as first seen by a stack, before any rewriting.
    pub fn original_url(&self) -> Option<&str> {
        self.original_url.as_deref()
    }

    /// Records the original URL. Later calls are ignored, so a sub-stack does
    /// not clobber what the outermost stack recorded.
    pub fn preserve_original_url(&mut self) {
        if self.original_url.is_none() {
            self.original_url = Some(self.url.clone());
        }
    }

    /// Returns the path portion of the current URL: protocol+host and query
    /// stripped, `/` when empty.
    pub fn path(&self) -> &str {
        super::pathname(&self.url)
    }

    /// Borrows the header map.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutably borrows the header map.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Borrows the extension map.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutably borrows the extension map.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
