//! In-memory loopback transport.
//!
//! Each connection is a pair of [`MemoryChannel`]s. A message sent on one end
//! is queued to a pump thread that hands it to the other end's handler, so
//! delivery never happens on the sender's stack.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thor_exchange::{
    Attribute, AttributeStore, ChannelHandler, ChannelId, EndpointUrl, ExchangeError,
    ExchangeResult, HostAddress, Message, TransportChannel, TransportClient, Transporter,
};

/// One end of an in-memory connection.
pub struct MemoryChannel {
    id: ChannelId,
    me: Weak<MemoryChannel>,
    url: RwLock<EndpointUrl>,
    local: HostAddress,
    remote: HostAddress,
    connected: AtomicBool,
    closed: AtomicBool,
    peer: Mutex<Option<mpsc::Sender<Message>>>,
    handler: Arc<dyn ChannelHandler>,
    attributes: AttributeStore,
    reconnects: AtomicUsize,
}

impl MemoryChannel {
    fn new(
        url: EndpointUrl,
        local: HostAddress,
        remote: HostAddress,
        handler: Arc<dyn ChannelHandler>,
        peer: mpsc::Sender<Message>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: ChannelId::next(),
            me: me.clone(),
            url: RwLock::new(url),
            local,
            remote,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            peer: Mutex::new(Some(peer)),
            handler,
            attributes: AttributeStore::new(),
            reconnects: AtomicUsize::new(0),
        })
    }

    fn as_dyn(&self) -> Option<Arc<dyn TransportChannel>> {
        self.me.upgrade().map(|me| me as Arc<dyn TransportChannel>)
    }

    /// Number of `reconnect` calls.
    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

impl fmt::Display for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory[{} {} -> {}]", self.id, self.local, self.remote)
    }
}

impl TransportChannel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn url(&self) -> EndpointUrl {
        self.url.read().clone()
    }

    fn send(&self, message: Message, _sent: bool) -> ExchangeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::transport(format!("{self} is closed")));
        }
        let Some(peer) = self.peer.lock().clone() else {
            return Err(ExchangeError::transport(format!("{self} has no peer")));
        };
        peer.send(message.clone())
            .map_err(|_| ExchangeError::transport(format!("{self}: peer hung up")))?;
        if let Some(me) = self.as_dyn() {
            self.handler.sent(&me, &message)?;
        }
        Ok(())
    }

    fn local_address(&self) -> Option<HostAddress> {
        Some(self.local.clone())
    }

    fn remote_address(&self) -> Option<HostAddress> {
        Some(self.remote.clone())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> ExchangeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connected.store(false, Ordering::SeqCst);
        self.peer.lock().take();
        if let Some(me) = self.as_dyn() {
            self.handler.disconnected(&me)?;
        }
        Ok(())
    }

    fn attribute(&self, key: &str) -> Option<Attribute> {
        self.attributes.get(key)
    }

    fn set_attribute(&self, key: &str, value: Attribute) {
        self.attributes.set(key, value);
    }

    fn remove_attribute(&self, key: &str) {
        self.attributes.remove(key);
    }
}

impl TransportClient for MemoryChannel {
    fn reconnect(&self) -> ExchangeResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::transport("cannot reconnect a closed memory channel"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&self, url: &EndpointUrl) -> ExchangeResult<()> {
        *self.url.write() = url.clone();
        Ok(())
    }

    fn as_channel(self: Arc<Self>) -> Arc<dyn TransportChannel> {
        self
    }
}

/// Deliver everything queued for `target` to its handler until the queue hangs up.
fn spawn_pump(queue: mpsc::Receiver<Message>, target: Weak<MemoryChannel>) {
    std::thread::spawn(move || {
        for message in queue {
            let Some(memory) = target.upgrade() else {
                break;
            };
            let handler = memory.handler.clone();
            let channel: Arc<dyn TransportChannel> = memory;
            if let Err(err) = handler.received(&channel, message) {
                handler.caught(&channel, &err);
            }
        }
    });
}

/// Transporter connecting every client to one in-process server handler.
pub struct MemoryTransporter {
    server: Arc<dyn ChannelHandler>,
    connects: AtomicUsize,
    next_port: AtomicU16,
    clients: Mutex<Vec<Arc<MemoryChannel>>>,
    servers: Mutex<Vec<Arc<MemoryChannel>>>,
}

impl MemoryTransporter {
    /// Create a transporter whose server side is driven by `server`.
    pub fn new(server: Arc<dyn ChannelHandler>) -> Arc<Self> {
        Arc::new(Self {
            server,
            connects: AtomicUsize::new(0),
            next_port: AtomicU16::new(40000),
            clients: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Number of connections opened so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Client end of the `index`th connection.
    pub fn client(&self, index: usize) -> Option<Arc<MemoryChannel>> {
        self.clients.lock().get(index).cloned()
    }

    /// Server end of the `index`th connection.
    pub fn server(&self, index: usize) -> Option<Arc<MemoryChannel>> {
        self.servers.lock().get(index).cloned()
    }
}

impl Transporter for MemoryTransporter {
    fn connect(
        &self,
        url: &EndpointUrl,
        handler: Arc<dyn ChannelHandler>,
    ) -> ExchangeResult<Arc<dyn TransportClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let local = HostAddress::new("127.0.0.1", self.next_port.fetch_add(1, Ordering::SeqCst));

        let (to_server, server_queue) = mpsc::channel();
        let (to_client, client_queue) = mpsc::channel();
        let client = MemoryChannel::new(url.clone(), local.clone(), url.address(), handler.clone(), to_server);
        let server = MemoryChannel::new(url.clone(), url.address(), local, self.server.clone(), to_client);
        spawn_pump(client_queue, Arc::downgrade(&client));
        spawn_pump(server_queue, Arc::downgrade(&server));

        let server_dyn: Arc<dyn TransportChannel> = server.clone();
        self.server.connected(&server_dyn)?;
        let client_dyn: Arc<dyn TransportChannel> = client.clone();
        handler.connected(&client_dyn)?;

        self.clients.lock().push(client.clone());
        self.servers.lock().push(server);
        Ok(client)
    }
}
