//! HTTP request methods and method masks.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::parser::error::Error;

/// HTTP request methods understood by the server.
///
/// Each method owns one bit so routes can register a [`Methods`] mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Method {
    /// GET method: Requests a representation of the specified resource.
    #[default]
    GET = 0b0000_0001,
    /// POST method: Submits data to be processed to the identified resource.
    POST = 0b0000_0010,
    /// DELETE method: Deletes the specified resource.
    DELETE = 0b0000_0100,
    /// PUT method: Replaces all current representations of the target resource with the request payload.
    PUT = 0b0000_1000,
    /// PATCH method: Applies partial modifications to a resource.
    PATCH = 0b0001_0000,
    /// HEAD method: Same as GET but only transfers the status line and header section.
    HEAD = 0b0010_0000,
    /// OPTIONS method: Describes the communication options for the target resource.
    OPTIONS = 0b0100_0000,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "DELETE" => Ok(Method::DELETE),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A set of methods a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Methods(u8);

impl Methods {
    pub const GET: Methods = Methods(Method::GET as u8);
    pub const POST: Methods = Methods(Method::POST as u8);
    pub const DELETE: Methods = Methods(Method::DELETE as u8);
    pub const PUT: Methods = Methods(Method::PUT as u8);
    pub const PATCH: Methods = Methods(Method::PATCH as u8);
    pub const HEAD: Methods = Methods(Method::HEAD as u8);
    pub const OPTIONS: Methods = Methods(Method::OPTIONS as u8);
    pub const ANY: Methods = Methods(0b0111_1111);

    /// Whether `method` is part of this set.
    pub fn contains(self, method: Method) -> bool {
        self.0 & method as u8 != 0
    }

    /// Iterate the methods in the set, in bit order.
    pub fn iter(self) -> impl Iterator<Item = Method> {
        [
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PUT,
            Method::PATCH,
            Method::HEAD,
            Method::OPTIONS,
        ]
        .into_iter()
        .filter(move |m| self.contains(*m))
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Methods(method as u8)
    }
}

impl BitOr for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Methods) -> Methods {
        Methods(self.0 | rhs.0)
    }
}

impl BitOr<Method> for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Method) -> Methods {
        Methods(self.0 | rhs as u8)
    }
}

impl BitOr for Method {
    type Output = Methods;

    fn bitor(self, rhs: Method) -> Methods {
        Methods(self as u8 | rhs as u8)
    }
}

impl fmt::Display for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Methods::ANY {
            return f.write_str("ANY");
        }
        let names: Vec<String> = self.iter().map(|m| m.to_string()).collect();
        f.write_str(&names.join(", "))
    }
}
