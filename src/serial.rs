//! Serial transport to the fader deck.
//!
//! A dedicated thread owns the port: reads block with a bounded timeout so
//! the thread can notice shutdown, complete lines are framed and forwarded
//! over a channel, and a lost port is reopened with a backoff. The async
//! side only ever sees [`DeckEvent`]s.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::*;
use serialport::{SerialPort, SerialPortType};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Written after every (re)connect to ask the firmware for a full frame.
const REFRESH_REQUEST: &[u8] = b"getVolume\n";

/// Upper bound on one blocking read; also the shutdown latency bound.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Delay before reopening a lost port.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Frames without a newline beyond this are garbage; drop the buffer.
const MAX_LINE_LEN: usize = 4096;

/// Event from the deck link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckEvent {
    /// Port opened (initially or after a reconnect).
    Connected,
    /// One complete text record.
    Line(String),
    /// Port lost; the link keeps retrying in the background.
    Disconnected,
}

/// Handle to the reader thread.
pub struct DeckLink {
    rx: mpsc::Receiver<DeckEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DeckLink {
    /// Spawn the reader thread for `port_name` at `baud_rate`.
    pub fn connect(port_name: String, baud_rate: u32) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("deck-serial".to_string())
            .spawn(move || reader_loop(&port_name, baud_rate, &thread_stop, &tx))
            .expect("failed to spawn serial reader thread");

        Self {
            rx,
            stop,
            handle: Some(handle),
        }
    }

    /// Next event from the link; `None` once the thread has exited.
    pub async fn next_event(&mut self) -> Option<DeckEvent> {
        self.rx.recv().await
    }

    /// Stop the reader thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeckLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reader_loop(
    port_name: &str,
    baud_rate: u32,
    stop: &AtomicBool,
    tx: &mpsc::Sender<DeckEvent>,
) {
    let mut announced_loss = false;

    while !stop.load(Ordering::Relaxed) {
        match open(port_name, baud_rate) {
            Ok(port) => {
                info!("Serial port {} open at {} baud", port_name, baud_rate);
                announced_loss = false;
                if tx.blocking_send(DeckEvent::Connected).is_err() {
                    return;
                }
                read_lines(port, stop, tx);
                if stop.load(Ordering::Relaxed) || tx.blocking_send(DeckEvent::Disconnected).is_err()
                {
                    return;
                }
            }
            Err(e) => {
                if !announced_loss {
                    warn!("Cannot open serial port {}: {}", port_name, e);
                    warn!("Please reconnect the fader deck (retrying every second)");
                    announced_loss = true;
                    if tx.blocking_send(DeckEvent::Disconnected).is_err() {
                        return;
                    }
                }
            }
        }
        thread::sleep(RECONNECT_DELAY);
    }
}

fn open(port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()?;

    // The firmware gates its output on the host handshake lines.
    port.write_data_terminal_ready(true)?;
    port.write_request_to_send(true)?;

    if let Err(e) = port.write_all(REFRESH_REQUEST).and_then(|_| port.flush()) {
        debug!("Could not request initial frame: {}", e);
    }

    Ok(port)
}

/// Pump the port until it fails or shutdown is requested.
fn read_lines(mut port: Box<dyn SerialPort>, stop: &AtomicBool, tx: &mpsc::Sender<DeckEvent>) {
    let mut buffer: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];

    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut chunk) {
            Ok(0) => {
                warn!("Serial port closed by peer");
                return;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                drain_lines(&mut buffer, tx);
                if buffer.len() > MAX_LINE_LEN {
                    debug!("Discarding {} bytes without line ending", buffer.len());
                    buffer.clear();
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                return;
            }
        }
    }
}

fn drain_lines(buffer: &mut Vec<u8>, tx: &mpsc::Sender<DeckEvent>) {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if !text.is_empty() {
            let _ = tx.blocking_send(DeckEvent::Line(text));
        }
    }
}

/// Print available serial ports (for `--list-ports`).
pub fn list_ports_formatted() {
    println!("\n{}", "=== Available Serial Ports ===".bold().cyan());

    match serialport::available_ports() {
        Ok(ports) if !ports.is_empty() => {
            for port in ports {
                match port.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let product = usb.product.unwrap_or_else(|| "unknown".to_string());
                        println!(
                            "  {} {} (USB {:04x}:{:04x})",
                            port.port_name.green(),
                            product,
                            usb.vid,
                            usb.pid
                        );
                    }
                    other => {
                        println!("  {} ({:?})", port.port_name.green(), other);
                    }
                }
            }
        }
        Ok(_) => println!("  {}", "No serial ports found".yellow()),
        Err(e) => println!("  {} {}", "Failed to enumerate ports:".red(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drained_lines_are_trimmed_and_split() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut buffer = b"0500|0500\r\n0400|0400\r\npartial".to_vec();

        tokio::task::spawn_blocking(move || drain_lines(&mut buffer, &tx))
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(DeckEvent::Line("0500|0500".into())));
        assert_eq!(rx.recv().await, Some(DeckEvent::Line("0400|0400".into())));
        assert_eq!(rx.try_recv().ok(), None);
    }

    #[tokio::test]
    async fn blank_lines_are_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut buffer = b"\r\n\r\n0100|0100\r\n".to_vec();

        tokio::task::spawn_blocking(move || drain_lines(&mut buffer, &tx))
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(DeckEvent::Line("0100|0100".into())));
        assert_eq!(rx.try_recv().ok(), None);
    }
}
