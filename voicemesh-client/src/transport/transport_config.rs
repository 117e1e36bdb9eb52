use voicemesh_core::IceServerConfig;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// ICE setup shared by every peer connection of a coordinator.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::default()],
        }
    }
}

impl TransportConfig {
    /// Host candidates only. Useful on a LAN and in tests.
    pub fn host_only() -> Self {
        Self {
            ice_servers: Vec::new(),
        }
    }

    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
            })
            .collect()
    }
}
