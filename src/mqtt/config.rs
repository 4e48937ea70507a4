//! Broker connection options and TLS material.

use crate::mqtt::LinkError;
use rumqttc::{LastWill, MqttOptions, QoS, TlsConfiguration, Transport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub keepalive_secs: u64,
    /// Quality of service for every publish: 0, 1 or 2.
    pub qos: u8,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub tls: TlsSettings,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keepalive_secs: 60,
            qos: 0,
            client_id: "telemetry-relay".to_string(),
            username: String::new(),
            password: String::new(),
            tls: TlsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub enabled: bool,
    /// Path to the trusted CA certificate bundle (PEM).
    pub ca_cert: String,
    /// Optional client certificate/key pair for mutual TLS (PEM paths).
    pub client_cert: String,
    pub client_key: String,
}

impl BrokerSettings {
    pub fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    /// Builds the rumqttc options, registering `last_will` before connecting
    /// so an unclean disconnect is observable on the liveness topic.
    pub fn mqtt_options(&self, last_will: LastWill) -> Result<MqttOptions, LinkError> {
        if self.client_id.is_empty() {
            return Err(LinkError::Options("client id must not be empty".into()));
        }

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keepalive_secs));
        options.set_last_will(last_will);
        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }
        if self.tls.enabled {
            options.set_transport(Transport::Tls(self.tls.configuration()?));
        }
        Ok(options)
    }
}

impl TlsSettings {
    fn configuration(&self) -> Result<TlsConfiguration, LinkError> {
        let ca = fs::read(&self.ca_cert).map_err(|e| {
            LinkError::TlsMaterial(format!("cannot read CA certificate {}: {e}", self.ca_cert))
        })?;
        let client_auth = if self.client_cert.is_empty() {
            None
        } else {
            let cert = fs::read(&self.client_cert).map_err(|e| {
                LinkError::TlsMaterial(format!(
                    "cannot read client certificate {}: {e}",
                    self.client_cert
                ))
            })?;
            let key = fs::read(&self.client_key).map_err(|e| {
                LinkError::TlsMaterial(format!("cannot read client key {}: {e}", self.client_key))
            })?;
            Some((cert, key))
        };
        Ok(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        })
    }
}
