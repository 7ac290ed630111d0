//! Decoding of syscall arguments copied out of a tracee.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Upper bound on path bytes copied from a tracee
pub const MAX_PATH_BYTES: usize = 256;
/// Upper bound on sockaddr bytes copied from a tracee
pub const MAX_SOCKADDR_BYTES: usize = 128;

/// Peer address from a raw sockaddr
///
/// `inet:` endpoints are network peers; `unix:` endpoints are local IPC.
pub fn decode_sockaddr(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 {
        return None;
    }
    let family = u16::from_ne_bytes([bytes[0], bytes[1]]) as i32;
    match family {
        libc::AF_INET if bytes.len() >= 8 => {
            let port = u16::from_be_bytes([bytes[2], bytes[3]]);
            let addr = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
            Some(format!("inet:{}:{}", addr, port))
        }
        libc::AF_INET6 if bytes.len() >= 24 => {
            let port = u16::from_be_bytes([bytes[2], bytes[3]]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&bytes[8..24]);
            Some(format!("inet:[{}]:{}", Ipv6Addr::from(octets), port))
        }
        libc::AF_UNIX => {
            let path = &bytes[2..];
            match path.first() {
                Some(0) => Some(format!("unix:@{}", c_string_lossy(&path[1..]))),
                Some(_) => Some(format!("unix:{}", c_string_lossy(path))),
                None => Some("unix:".to_string()),
            }
        }
        _ => None,
    }
}

/// True for endpoints that leave the host
pub fn is_network_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("inet:")
}

/// Bytes up to the first NUL, lossily decoded
pub fn c_string_lossy(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Final path component
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inet4(addr: [u8; 4], port: u16) -> Vec<u8> {
        let mut out = (libc::AF_INET as u16).to_ne_bytes().to_vec();
        out.extend_from_slice(&port.to_be_bytes());
        out.extend_from_slice(&addr);
        out.extend_from_slice(&[0u8; 8]);
        out
    }

    #[test]
    fn test_decode_ipv4() {
        let endpoint = decode_sockaddr(&inet4([93, 184, 216, 34], 443)).unwrap();
        assert_eq!(endpoint, "inet:93.184.216.34:443");
        assert!(is_network_endpoint(&endpoint));
    }

    #[test]
    fn test_decode_ipv6_loopback() {
        let mut bytes = (libc::AF_INET6 as u16).to_ne_bytes().to_vec();
        bytes.extend_from_slice(&8080u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        let mut addr = [0u8; 16];
        addr[15] = 1;
        bytes.extend_from_slice(&addr);
        bytes.extend_from_slice(&[0u8; 4]);
        assert_eq!(decode_sockaddr(&bytes).unwrap(), "inet:[::1]:8080");
    }

    #[test]
    fn test_decode_unix_socket_is_local() {
        let mut bytes = (libc::AF_UNIX as u16).to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"/run/nscd/socket\0garbage");
        let endpoint = decode_sockaddr(&bytes).unwrap();
        assert_eq!(endpoint, "unix:/run/nscd/socket");
        assert!(!is_network_endpoint(&endpoint));
    }

    #[test]
    fn test_truncated_sockaddr_rejected() {
        assert!(decode_sockaddr(&[]).is_none());
        let short = inet4([1, 2, 3, 4], 1);
        assert!(decode_sockaddr(&short[..6]).is_none());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/tmp/.hidden"), ".hidden");
        assert_eq!(basename("plain"), "plain");
    }
}
