//! SSDP responder answering Hue bridge discovery
//!
//! Hue clients multicast `M-SEARCH * HTTP/1.1` for the UPnP basic device and
//! expect a unicast `200 OK` pointing at the bridge descriptor. Everything
//! that is not such a search is ignored; UDP is best effort, so nothing is
//! retried.

use huebridge_core::BridgeProfile;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::DiscoveryError;

/// Largest datagram read from the socket
pub const MAX_DATAGRAM_SIZE: usize = 1500;

const SEARCH_METHOD: &str = "M-SEARCH";
const SSDP_DISCOVER: &str = "\"ssdp:discover\"";

/// An HTTP-over-UDP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpRequest {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
}

impl SsdpRequest {
    /// Parse a datagram as an HTTP/1.x request head
    pub fn parse(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        let mut lines = text.split("\r\n").flat_map(|l| l.split('\n'));

        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let path = parts.next()?.to_string();
        let version = parts.next()?;
        if !version.starts_with("HTTP/1.") || parts.next().is_some() {
            return None;
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            // A header line without a colon makes the whole request malformed
            let (name, value) = line.split_once(':')?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Some(Self {
            method,
            path,
            headers,
        })
    }

    /// First header with this name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a search for the device type the bridge advertises
    pub fn is_discovery_for(&self, search_target: &str) -> bool {
        self.method == SEARCH_METHOD
            && self.path == "*"
            && self.header("Man") == Some(SSDP_DISCOVER)
            && self.header("St") == Some(search_target)
    }
}

/// Unicast reply to a matching search
pub fn search_response(profile: &BridgeProfile) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Cache-Control: max-age={max_age}\r\n\
         Ext: \r\n\
         Location: {location}\r\n\
         Opt: \"http://schemas.upnp.org/upnp/1/0/\"; ns=01\r\n\
         St: {st}\r\n\
         Usn: {usn}\r\n\
         \r\n",
        max_age = profile.ssdp_max_age_secs,
        location = profile.location(),
        st = profile.search_target,
        usn = profile.usn(),
    )
}

/// Running SSDP responder. Dropping it without [`SsdpResponder::stop`] leaves
/// the listen task running until its socket fails.
pub struct SsdpResponder {
    local_addr: SocketAddr,
    joined: Vec<String>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SsdpResponder {
    /// Bind the SSDP port, join the multicast group on every usable interface
    /// and start answering searches.
    pub async fn start(profile: Arc<BridgeProfile>) -> Result<Self, DiscoveryError> {
        let group = profile.multicast_group;
        let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port());
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| DiscoveryError::Bind(SocketAddr::V4(bind), e))?;

        let joined = join_multicast(&socket, *group.ip(), &multicast_candidates()?)?;
        info!(
            group = %group,
            interfaces = %joined.join(" "),
            "Started SSDP responder"
        );

        let mut responder = Self::serve(socket, profile)?;
        responder.joined = joined;
        Ok(responder)
    }

    /// Answer searches arriving on an already bound socket
    pub fn serve(socket: UdpSocket, profile: Arc<BridgeProfile>) -> Result<Self, DiscoveryError> {
        let local_addr = socket.local_addr().map_err(DiscoveryError::Socket)?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listen(socket, profile, shutdown_rx));

        Ok(Self {
            local_addr,
            joined: Vec::new(),
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Interfaces the multicast group was joined on
    pub fn joined_interfaces(&self) -> &[String] {
        &self.joined
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop listening and release the socket
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "SSDP listen task ended abnormally");
        }
        debug!("SSDP responder stopped");
    }
}

/// Non-loopback IPv4 interface addresses, with their interface names
fn multicast_candidates() -> Result<Vec<(String, Ipv4Addr)>, DiscoveryError> {
    let interfaces =
        NetworkInterface::show().map_err(|e| DiscoveryError::Interfaces(e.to_string()))?;

    let mut candidates = Vec::new();
    for iface in interfaces {
        for addr in &iface.addr {
            if let Addr::V4(v4) = addr {
                if !v4.ip.is_loopback() {
                    candidates.push((iface.name.clone(), v4.ip));
                }
            }
        }
    }
    Ok(candidates)
}

/// Join the group on each candidate address.
///
/// Individual failures are tolerated; joining nothing is an error.
fn join_multicast(
    socket: &UdpSocket,
    group: Ipv4Addr,
    candidates: &[(String, Ipv4Addr)],
) -> Result<Vec<String>, DiscoveryError> {
    let mut joined = Vec::new();
    for (name, ip) in candidates {
        match socket.join_multicast_v4(group, *ip) {
            Ok(()) => {
                debug!(interface = %name, ip = %ip, "Joined SSDP multicast group");
                joined.push(name.clone());
            }
            Err(e) => {
                warn!(
                    interface = %name,
                    ip = %ip,
                    error = %e,
                    "Failed to join SSDP multicast group"
                );
            }
        }
    }

    if joined.is_empty() {
        return Err(DiscoveryError::NoMulticastInterfaces);
    }
    Ok(joined)
}

async fn listen(
    socket: UdpSocket,
    profile: Arc<BridgeProfile>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("SSDP listen loop shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => handle_datagram(&buf[..len], from, &profile).await,
                    Err(e) => {
                        error!(error = %e, "Failed to read from SSDP socket");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_datagram(data: &[u8], from: SocketAddr, profile: &BridgeProfile) {
    let Some(request) = SsdpRequest::parse(data) else {
        trace!(from = %from, "Ignoring malformed SSDP datagram");
        return;
    };

    if !request.is_discovery_for(&profile.search_target) {
        trace!(from = %from, method = %request.method, "Ignoring SSDP datagram");
        return;
    }

    info!(address = %from, "Received discovery request");
    if let Err(e) = respond(from, profile).await {
        error!(address = %from, error = %e, "Failed to answer discovery request");
    }
}

/// Open a unicast socket back to the searcher and send the reply
async fn respond(to: SocketAddr, profile: &BridgeProfile) -> std::io::Result<()> {
    let bind: SocketAddr = match to {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(to).await?;
    socket.send(search_response(profile).as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                          HOST: 239.255.255.250:1900\r\n\
                          MAN: \"ssdp:discover\"\r\n\
                          MX: 3\r\n\
                          ST: urn:schemas-upnp-org:device:basic:1\r\n\
                          \r\n";

    fn profile() -> Arc<BridgeProfile> {
        Arc::new(BridgeProfile::new("10.0.0.5:8080".parse().unwrap()))
    }

    #[test]
    fn test_parse_search() {
        let request = SsdpRequest::parse(SEARCH.as_bytes()).unwrap();
        assert_eq!(request.method, "M-SEARCH");
        assert_eq!(request.path, "*");
        assert_eq!(request.header("man"), Some("\"ssdp:discover\""));
        assert_eq!(request.header("St"), Some("urn:schemas-upnp-org:device:basic:1"));
        assert!(request.is_discovery_for("urn:schemas-upnp-org:device:basic:1"));
    }

    #[test]
    fn test_non_discovery_requests() {
        let target = "urn:schemas-upnp-org:device:basic:1";

        let notify = SEARCH.replace("M-SEARCH", "NOTIFY");
        assert!(!SsdpRequest::parse(notify.as_bytes()).unwrap().is_discovery_for(target));

        let path = SEARCH.replace("M-SEARCH *", "M-SEARCH /");
        assert!(!SsdpRequest::parse(path.as_bytes()).unwrap().is_discovery_for(target));

        let unquoted = SEARCH.replace("\"ssdp:discover\"", "ssdp:discover");
        assert!(!SsdpRequest::parse(unquoted.as_bytes()).unwrap().is_discovery_for(target));

        let other_target = SEARCH.replace("device:basic:1", "device:MediaRenderer:1");
        assert!(!SsdpRequest::parse(other_target.as_bytes()).unwrap().is_discovery_for(target));

        let no_st: String = SEARCH
            .lines()
            .filter(|l| !l.starts_with("ST:"))
            .map(|l| format!("{}\n", l))
            .collect();
        assert!(!SsdpRequest::parse(no_st.as_bytes()).unwrap().is_discovery_for(target));

        assert!(SsdpRequest::parse(b"\xff\xfe garbage").is_none());
        assert!(SsdpRequest::parse(b"M-SEARCH *\r\n\r\n").is_none());
    }

    #[test]
    fn test_search_response_headers() {
        let response = search_response(&profile());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Cache-Control: max-age=300\r\n"));
        assert!(response.contains("Location: http://10.0.0.5:8080/upnp/setup.xml\r\n"));
        assert!(response.contains("St: urn:schemas-upnp-org:device:basic:1\r\n"));
        assert!(response.contains("Usn: uuid:f6543a06-800d-48ba-8d8f-bc2949eddc33\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    async fn loopback_responder() -> (SsdpResponder, UdpSocket) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder = SsdpResponder::serve(socket, profile()).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (responder, client)
    }

    #[tokio::test]
    async fn test_search_gets_exactly_one_reply() {
        let (responder, client) = loopback_responder().await;
        client
            .send_to(SEARCH.as_bytes(), responder.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("no SSDP reply")
            .unwrap();
        let reply = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.contains("Location: http://10.0.0.5:8080/upnp/setup.xml"));

        let second = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
        assert!(second.is_err(), "expected a single reply");

        responder.stop().await;
    }

    #[tokio::test]
    async fn test_incomplete_search_gets_no_reply() {
        let (responder, client) = loopback_responder().await;
        let no_man: String = SEARCH
            .split("\r\n")
            .filter(|l| !l.starts_with("MAN:"))
            .collect::<Vec<_>>()
            .join("\r\n");
        client
            .send_to(no_man.as_bytes(), responder.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let reply = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
        assert!(reply.is_err());

        // Still serving after ignoring the datagram
        assert!(responder.is_running());
        responder.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_listen_task() {
        let (responder, _client) = loopback_responder().await;
        assert!(responder.is_running());
        timeout(Duration::from_secs(2), responder.stop())
            .await
            .expect("stop did not complete");
    }

    /// TEST-NET-1 address no local interface owns
    const UNASSIGNED: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    #[tokio::test]
    async fn test_no_joinable_interface_is_fatal() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let group = *profile().multicast_group.ip();

        let err = join_multicast(&socket, group, &[("bogus0".to_string(), UNASSIGNED)])
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoMulticastInterfaces));

        let err = join_multicast(&socket, group, &[]).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoMulticastInterfaces));
    }

    #[tokio::test]
    async fn test_partial_join_is_tolerated() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let group = *profile().multicast_group.ip();
        let candidates = vec![
            ("bogus0".to_string(), UNASSIGNED),
            ("lo".to_string(), Ipv4Addr::LOCALHOST),
        ];

        let joined = join_multicast(&socket, group, &candidates).unwrap();
        assert_eq!(joined, vec!["lo".to_string()]);
    }
}
