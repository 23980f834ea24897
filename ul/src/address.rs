//! Abstractions for compound application entity addresses,
//! in the form `AE-TITLE@host:port`.
//!
//! The AE title part is optional:
//! a plain socket address is also a valid [`AeAddr`].
//! This form of address is accepted
//! when establishing client associations
//! (see [`establish_with`][1])
//! and is the natural output of a C-MOVE destination resolver.
//!
//! [1]: crate::association::ClientAssociationOptions::establish_with

use std::convert::TryFrom;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// A compound address of an application entity:
/// an optional AE title plus a network socket address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AeAddr<T> {
    /// the application entity title, when known
    ae_title: Option<String>,
    /// the bare network socket address
    socket_addr: T,
}

impl<T> AeAddr<T> {
    /// Create an address with an AE title.
    pub fn new(ae_title: impl Into<String>, socket_addr: T) -> Self {
        AeAddr {
            ae_title: Some(ae_title.into()),
            socket_addr,
        }
    }

    /// Create an address without an AE title.
    pub fn new_socket_addr(socket_addr: T) -> Self {
        AeAddr {
            ae_title: None,
            socket_addr,
        }
    }

    /// Retrieve the application entity title, if present.
    pub fn ae_title(&self) -> Option<&str> {
        self.ae_title.as_deref()
    }

    /// Retrieve the bare network socket address.
    pub fn socket_addr(&self) -> &T {
        &self.socket_addr
    }
}

impl FromStr for AeAddr<String> {
    type Err = InvalidAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AeAddr::try_from(s)
    }
}

/// The given string is not a valid compound address.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidAddressError;

impl fmt::Display for InvalidAddressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid application entity address")
    }
}

impl std::error::Error for InvalidAddressError {}

impl TryFrom<&str> for AeAddr<String> {
    type Error = InvalidAddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.split_once('@') {
            Some((ae_title, address)) if !ae_title.is_empty() && !address.is_empty() => {
                Ok(AeAddr {
                    ae_title: Some(ae_title.to_string()),
                    socket_addr: address.to_string(),
                })
            }
            Some(_) => Err(InvalidAddressError),
            None => Err(InvalidAddressError),
        }
    }
}

impl<T> fmt::Display for AeAddr<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ae_title) = &self.ae_title {
            write!(f, "{}@{}", ae_title, self.socket_addr)?;
        } else {
            write!(f, "{}", self.socket_addr)?;
        }
        Ok(())
    }
}

impl<T> ToSocketAddrs for AeAddr<T>
where
    T: ToSocketAddrs,
{
    type Iter = T::Iter;

    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        self.socket_addr.to_socket_addrs()
    }
}

impl From<SocketAddr> for AeAddr<SocketAddr> {
    fn from(socket_addr: SocketAddr) -> Self {
        AeAddr {
            ae_title: None,
            socket_addr,
        }
    }
}
