//! Serial transport implementation over `tokio-serial`

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use meter_protocols::hex;
use tracing::{debug, error, info, warn};

use super::traits::{SerialSettings, Transport, TransportError, TransportStats};

fn parse_parity(parity: &str) -> tokio_serial::Parity {
    match parity {
        "Even" => tokio_serial::Parity::Even,
        "Odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    }
}

fn parse_flow_control(flow_control: &str) -> tokio_serial::FlowControl {
    match flow_control {
        "Software" => tokio_serial::FlowControl::Software,
        "Hardware" => tokio_serial::FlowControl::Hardware,
        _ => tokio_serial::FlowControl::None,
    }
}

fn parse_data_bits(data_bits: u8) -> tokio_serial::DataBits {
    match data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn parse_stop_bits(stop_bits: u8) -> tokio_serial::StopBits {
    match stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

/// Serial port transport
#[derive(Debug, Default)]
pub struct SerialTransport {
    /// Open port, `None` while closed
    port: Option<SerialStream>,
    /// Settings of the last successful open
    settings: Option<SerialSettings>,
    stats: TransportStats,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port path of the last successful open
    pub fn port_name(&self) -> Option<&str> {
        self.settings.as_ref().map(|s| s.port.as_str())
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn name(&self) -> &str {
        "Serial Transport"
    }

    async fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError> {
        if self.port.is_some() {
            self.close().await?;
        }

        self.stats.record_open_attempt();
        if let Err(e) = settings.validate() {
            self.stats.record_open_failure();
            return Err(e);
        }

        debug!("Opening serial port: {} @ {}", settings.port, settings.baud_rate);

        let port_result = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(parse_data_bits(settings.data_bits))
            .parity(parse_parity(&settings.parity))
            .stop_bits(parse_stop_bits(settings.stop_bits))
            .flow_control(parse_flow_control(&settings.flow_control))
            .open_native_async();

        match port_result {
            Ok(port) => {
                #[cfg(unix)]
                let port = {
                    let mut port = port;
                    if let Err(e) = port.set_exclusive(false) {
                        warn!("Failed to clear exclusive mode on {}: {}", settings.port, e);
                    }
                    port
                };

                self.port = Some(port);
                self.settings = Some(settings.clone());
                self.stats.record_open_success();
                info!("Opened serial port: {}", settings.port);
                Ok(())
            },
            Err(e) => {
                let error_msg = format!("Failed to open serial port {}: {e}", settings.port);
                error!("{error_msg}");
                self.stats.record_open_failure();
                Err(TransportError::ConnectionFailed(error_msg))
            },
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the stream closes the descriptor
        if self.port.take().is_some() {
            self.stats.record_close();
            info!("Closed serial port: {}", self.port_name().unwrap_or("-"));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let write_timeout = self
            .settings
            .as_ref()
            .map(|s| s.write_timeout)
            .unwrap_or_default();
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;

        let send_operation = async {
            port.write_all(data).await?;
            port.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(write_timeout, send_operation).await {
            Ok(Ok(bytes_sent)) => {
                self.stats.record_bytes_sent(bytes_sent);
                debug!(hex_data = %hex::encode_upper(data), length = bytes_sent, direction = "send", "[Serial Transport] Raw packet");
                Ok(bytes_sent)
            },
            Ok(Err(e)) => Err(TransportError::SendFailed(e.to_string())),
            Err(_) => Err(TransportError::Timeout(format!(
                "Send operation timed out after {write_timeout:?}"
            ))),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;

        match port.read(buf).await {
            Ok(0) => Err(TransportError::ConnectionLost(
                "serial stream reached end of file".to_string(),
            )),
            Ok(bytes_read) => {
                self.stats.record_bytes_received(bytes_read);
                debug!(hex_data = %hex::encode_upper(&buf[..bytes_read]), length = bytes_read, direction = "recv", "[Serial Transport] Raw packet");
                Ok(bytes_read)
            },
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
