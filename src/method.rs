//! HTTP method as a typed enum.
//!
//! Routes may only be declared for the methods listed here. Anything else on
//! the wire is rejected at the dispatch level with `405 Method Not Allowed`
//! before it ever reaches a route chain.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// A route-able HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get     => "GET",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Patch   => "PATCH",
            Self::Delete  => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head    => "HEAD",
        }
    }

    /// Lowercase form, used by route-id templates (`{method}` token).
    pub(crate) fn as_lower(self) -> &'static str {
        match self {
            Self::Get     => "get",
            Self::Post    => "post",
            Self::Put     => "put",
            Self::Patch   => "patch",
            Self::Delete  => "delete",
            Self::Options => "options",
            Self::Head    => "head",
        }
    }

    /// Whether requests with this method carry a payload the framework should
    /// be willing to parse. GET / OPTIONS / HEAD never get a body-parsing
    /// step, no matter what content types the route declares.
    pub fn carries_body(self) -> bool {
        !matches!(self, Self::Get | Self::Options | Self::Head)
    }

    /// Parses an uppercase method string, failing with a configuration error
    /// that names the offending value.
    pub fn parse(s: &str) -> Result<Self, ConfigurationError> {
        s.parse()
            .map_err(|()| ConfigurationError::UnsupportedMethod(s.to_owned()))
    }
}

/// Case-sensitive per RFC 9110 §9.1: methods are uppercase on the wire.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET"     => Ok(Self::Get),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "PATCH"   => Ok(Self::Patch),
            "DELETE"  => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            "HEAD"    => Ok(Self::Head),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
