//! [`Endpoint`]: an address family tag plus an IPv4/IPv6 address and port
//! (spec §3). `std::net::SocketAddr` already carries exactly this
//! information and already compares bitwise-equal on the address form, so
//! `Endpoint` is a newtype rather than a reimplementation.

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }

    pub fn family(&self) -> AddressFamily {
        match self.0.ip() {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// Resolves `spec` (e.g. `"localhost:7000"`) to an `Endpoint`, taking
    /// the first candidate address returned by the system resolver.
    pub fn resolve(spec: &str) -> std::io::Result<Self> {
        spec.to_socket_addrs()?
            .next()
            .map(Endpoint)
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
            })
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_bitwise_on_the_socket_addr() {
        let a = Endpoint::new("127.0.0.1:8080".parse().unwrap());
        let b = Endpoint::new("127.0.0.1:8080".parse().unwrap());
        let c = Endpoint::new("127.0.0.1:8081".parse().unwrap());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.family(), AddressFamily::V4);
    }
}
