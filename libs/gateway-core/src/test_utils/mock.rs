//! In-memory transports
//!
//! Clones share state, so a test keeps one handle for inspection and hands
//! the other to the gateway.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use errors::{GatewayError, GatewayResult};
use parking_lot::Mutex;

use crate::transport::{
    Connection, DatagramTransport, ModbusSettings, RegisterTransport, UdpSettings,
};

/// Failure a mock raises instead of answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Io,
    Timeout,
    DeviceException(u8),
    Garbage,
}

impl InjectedFailure {
    fn to_error(self, what: &str) -> GatewayError {
        match self {
            Self::Io => std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer").into(),
            Self::Timeout => GatewayError::timeout(what),
            Self::DeviceException(code) => GatewayError::DeviceException {
                function: 0x03,
                code,
            },
            Self::Garbage => GatewayError::unknown_response(what),
        }
    }
}

/// One transport call, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect,
    Disconnect,
    Read { offset: u16, count: u16 },
    Write { offset: u16, values: Vec<u16> },
    Send(String),
}

/// Callback run after every disconnect, outside the mock's lock
#[derive(Clone, Default)]
struct DisconnectHook(Option<Arc<dyn Fn() + Send + Sync>>);

impl DisconnectHook {
    fn run(&self) {
        if let Some(hook) = &self.0 {
            hook();
        }
    }
}

impl fmt::Debug for DisconnectHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "DisconnectHook(set)" } else { "DisconnectHook(none)" })
    }
}

fn assert_paired(journal: &[MockCall]) -> bool {
    let mut open = false;
    for call in journal {
        match call {
            MockCall::Connect if open => return false,
            MockCall::Connect => open = true,
            MockCall::Disconnect => open = false,
            _ if !open => return false,
            _ => {},
        }
    }
    true
}

// ============================================================================
// Register transport
// ============================================================================

#[derive(Debug, Default)]
struct RegisterState {
    registers: HashMap<u16, u16>,
    pinned: HashMap<u16, u16>,
    connected: bool,
    connect_count: usize,
    disconnect_count: usize,
    fail_connect: bool,
    read_failures: HashMap<u16, InjectedFailure>,
    write_failure: Option<InjectedFailure>,
    delay: Duration,
    reads: Vec<(u16, u16)>,
    journal: Vec<MockCall>,
    on_disconnect: DisconnectHook,
}

/// Register transport backed by a map of holding registers
#[derive(Debug, Clone, Default)]
pub struct MockRegisterTransport {
    settings: ModbusSettings,
    state: Arc<Mutex<RegisterState>>,
}

impl MockRegisterTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_registers(&self, offset: u16, values: &[u16]) {
        let mut state = self.state.lock();
        for (i, value) in values.iter().enumerate() {
            state.registers.insert(offset + i as u16, *value);
        }
    }

    pub fn register(&self, offset: u16) -> Option<u16> {
        self.state.lock().registers.get(&offset).copied()
    }

    /// Keep a register at `value` whatever is written to it
    pub fn pin_register(&self, offset: u16, value: u16) {
        let mut state = self.state.lock();
        state.pinned.insert(offset, value);
        state.registers.insert(offset, value);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Fail every read whose range touches `offset`
    pub fn fail_read_at(&self, offset: u16, failure: InjectedFailure) {
        self.state.lock().read_failures.insert(offset, failure);
    }

    pub fn fail_writes(&self, failure: Option<InjectedFailure>) {
        self.state.lock().write_failure = failure;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.read_failures.clear();
        state.write_failure = None;
        state.fail_connect = false;
    }

    /// Delay applied to every read and write
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnect_count
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().connected
    }

    /// `(offset, count)` of every read so far
    pub fn reads(&self) -> Vec<(u16, u16)> {
        self.state.lock().reads.clone()
    }

    pub fn journal(&self) -> Vec<MockCall> {
        self.state.lock().journal.clone()
    }

    /// True when every exchange happened inside its own connect/disconnect pair
    pub fn sessions_are_serialized(&self) -> bool {
        assert_paired(&self.state.lock().journal)
    }

    /// Run `hook` after every disconnect; lets a test look at the gateway
    /// at the moment its session closes
    pub fn on_disconnect(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().on_disconnect = DisconnectHook(Some(Arc::new(hook)));
    }

    fn delay(&self) -> Duration {
        self.state.lock().delay
    }
}

#[async_trait]
impl Connection for MockRegisterTransport {
    type Settings = ModbusSettings;

    async fn connect(&mut self) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.connect_count += 1;
        state.journal.push(MockCall::Connect);
        if state.fail_connect {
            return Err(GatewayError::connection_failed(
                self.settings.endpoint(),
                "connection refused",
            ));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let hook = {
            let mut state = self.state.lock();
            state.disconnect_count += 1;
            state.connected = false;
            state.journal.push(MockCall::Disconnect);
            state.on_disconnect.clone()
        };
        hook.run();
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn settings(&self) -> &ModbusSettings {
        &self.settings
    }

    fn update_settings(&mut self, settings: ModbusSettings) {
        self.settings = settings;
    }

    fn endpoint(&self) -> String {
        format!("mock://{}", self.settings.endpoint())
    }
}

#[async_trait]
impl RegisterTransport for MockRegisterTransport {
    async fn read_registers(&mut self, offset: u16, count: u16) -> GatewayResult<Vec<u16>> {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        state.reads.push((offset, count));
        state.journal.push(MockCall::Read { offset, count });

        let end = u32::from(offset) + u32::from(count);
        if let Some((_, failure)) = state
            .read_failures
            .iter()
            .find(|(at, _)| u32::from(**at) >= u32::from(offset) && u32::from(**at) < end)
        {
            return Err(failure.to_error(&format!("read {}+{}", offset, count)));
        }

        Ok((0..count)
            .map(|i| state.registers.get(&(offset + i)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> GatewayResult<()> {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        state.journal.push(MockCall::Write {
            offset,
            values: values.to_vec(),
        });
        if let Some(failure) = state.write_failure {
            return Err(failure.to_error(&format!("write {}", offset)));
        }
        for (i, value) in values.iter().enumerate() {
            let at = offset + i as u16;
            if !state.pinned.contains_key(&at) {
                state.registers.insert(at, *value);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Datagram transport
// ============================================================================

#[derive(Debug, Default)]
struct DatagramState {
    replies: HashMap<String, String>,
    fallback: Option<String>,
    connected: bool,
    connect_count: usize,
    disconnect_count: usize,
    fail_connect: bool,
    journal: Vec<MockCall>,
    on_disconnect: DisconnectHook,
}

/// Text transport answering from a table of canned replies
///
/// A request with no canned reply fails with a timeout right away.
#[derive(Debug, Clone, Default)]
pub struct MockDatagramTransport {
    settings: UdpSettings,
    state: Arc<Mutex<DatagramState>>,
}

impl MockDatagramTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, request: &str, response: &str) {
        self.state
            .lock()
            .replies
            .insert(request.to_string(), response.to_string());
    }

    /// Reply used for requests without a canned answer
    pub fn reply_otherwise(&self, response: Option<&str>) {
        self.state.lock().fallback = response.map(str::to_string);
    }

    /// Drop every canned reply; the device goes silent
    pub fn silence(&self) {
        let mut state = self.state.lock();
        state.replies.clear();
        state.fallback = None;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnect_count
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().connected
    }

    /// Every request sent so far
    pub fn sent(&self) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|call| match call {
                MockCall::Send(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn journal(&self) -> Vec<MockCall> {
        self.state.lock().journal.clone()
    }

    pub fn sessions_are_serialized(&self) -> bool {
        assert_paired(&self.state.lock().journal)
    }

    /// Run `hook` after every disconnect; lets a test look at the gateway
    /// at the moment its session closes
    pub fn on_disconnect(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().on_disconnect = DisconnectHook(Some(Arc::new(hook)));
    }
}

#[async_trait]
impl Connection for MockDatagramTransport {
    type Settings = UdpSettings;

    async fn connect(&mut self) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.connect_count += 1;
        state.journal.push(MockCall::Connect);
        if state.fail_connect {
            return Err(GatewayError::connection_failed(
                self.settings.endpoint(),
                "address in use",
            ));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let hook = {
            let mut state = self.state.lock();
            state.disconnect_count += 1;
            state.connected = false;
            state.journal.push(MockCall::Disconnect);
            state.on_disconnect.clone()
        };
        hook.run();
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn settings(&self) -> &UdpSettings {
        &self.settings
    }

    fn update_settings(&mut self, settings: UdpSettings) {
        self.settings = settings;
    }

    fn endpoint(&self) -> String {
        format!("mock://{}", self.settings.endpoint())
    }
}

#[async_trait]
impl DatagramTransport for MockDatagramTransport {
    async fn send_receive(&mut self, request: &str) -> GatewayResult<String> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(GatewayError::NotConnected);
        }
        state.journal.push(MockCall::Send(request.to_string()));
        state
            .replies
            .get(request)
            .or(state.fallback.as_ref())
            .cloned()
            .ok_or_else(|| GatewayError::timeout(format!("mock (no reply to '{}')", request)))
    }
}
