//! Local network interfaces, listed by the names `--device` accepts.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::IpAddr;

/// Interface name to its IP addresses, both sorted.
pub type InterfaceMap = BTreeMap<String, BTreeSet<IpAddr>>;

/// Interfaces that carry at least one IPv4 or IPv6 address.
#[cfg(unix)]
pub fn list() -> io::Result<InterfaceMap> {
    use std::net::{SocketAddrV4, SocketAddrV6};

    use nix::ifaddrs::getifaddrs;

    let mut interfaces = InterfaceMap::new();
    for entry in getifaddrs()? {
        let Some(address) = entry.address else {
            continue;
        };
        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(*SocketAddrV4::from(*v4).ip())
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(*SocketAddrV6::from(*v6).ip())
        } else {
            continue;
        };
        interfaces.entry(entry.interface_name).or_default().insert(ip);
    }
    Ok(interfaces)
}

#[cfg(not(unix))]
pub fn list() -> io::Result<InterfaceMap> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "listing network interfaces is not supported on this platform",
    ))
}

/// One line per interface: `name      [addr, addr]`.
pub fn render(interfaces: &InterfaceMap) -> String {
    interfaces
        .iter()
        .map(|(name, addresses)| {
            let addresses: Vec<String> = addresses.iter().map(ToString::to_string).collect();
            format!("{name}      [{}]", addresses.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render, InterfaceMap};
    use std::net::IpAddr;

    #[test]
    fn renders_sorted_names_and_addresses() {
        let mut interfaces = InterfaceMap::new();
        for (name, ip) in [
            ("wlan0", "192.168.1.20"),
            ("eth0", "fe80::1"),
            ("eth0", "10.0.0.2"),
        ] {
            interfaces
                .entry(name.to_string())
                .or_default()
                .insert(ip.parse::<IpAddr>().unwrap());
        }
        assert_eq!(
            render(&interfaces),
            "eth0      [10.0.0.2, fe80::1]\nwlan0      [192.168.1.20]"
        );
    }

    #[test]
    fn nothing_to_render() {
        assert_eq!(render(&InterfaceMap::new()), "");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn loopback_is_listed() {
        let interfaces = super::list().unwrap();
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(interfaces.values().any(|addresses| addresses.contains(&loopback)));
    }
}
