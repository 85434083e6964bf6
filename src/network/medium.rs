//! In-memory radio medium.
//!
//! Stations attach to a shared [`RadioMedium`] through [`MediumTransport`].
//! A broadcast reaches every station in range, a unicast reaches one and
//! reports `NoAck` when it cannot. Range defaults to everyone hearing
//! everyone; adding links with [`RadioMedium::link`] switches to an explicit
//! topology. Frame loss is drawn from a seeded RNG so runs are repeatable.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::dispatch::SendStatusSink;
use super::inbound::InboundSink;
use super::transport::{Transport, TransportHooks};
use crate::core::{Destination, Error, NodeId, TransportError};

/// Signal strength reported for every frame unless configured otherwise
pub const DEFAULT_SIGNAL_STRENGTH: i8 = -60;

struct MediumInner {
    stations: BTreeMap<NodeId, InboundSink>,
    links: Option<HashSet<(NodeId, NodeId)>>,
    loss: f64,
    rng: StdRng,
    signal_strength: i8,
}

impl MediumInner {
    fn in_range(&self, from: NodeId, to: NodeId) -> bool {
        from != to && self.links.as_ref().map_or(true, |links| links.contains(&(from, to)))
    }

    fn lost(&mut self) -> bool {
        self.loss > 0.0 && self.rng.gen_bool(self.loss)
    }
}

/// Shared medium connecting simulated stations
#[derive(Clone)]
pub struct RadioMedium {
    inner: Arc<Mutex<MediumInner>>,
}

impl Default for RadioMedium {
    fn default() -> Self {
        RadioMedium::new()
    }
}

impl RadioMedium {
    /// Creates a lossless medium where every station hears every other
    pub fn new() -> Self {
        RadioMedium::with_loss(0.0, 0)
    }

    /// Creates a medium dropping each frame copy with probability `loss`
    pub fn with_loss(loss: f64, seed: u64) -> Self {
        RadioMedium {
            inner: Arc::new(Mutex::new(MediumInner {
                stations: BTreeMap::new(),
                links: None,
                loss: loss.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed),
                signal_strength: DEFAULT_SIGNAL_STRENGTH,
            })),
        }
    }

    /// Sets the signal strength reported with received frames
    pub fn set_signal_strength(&self, dbm: i8) -> Result<(), TransportError> {
        self.lock()?.signal_strength = dbm;
        Ok(())
    }

    /// Puts `a` and `b` in range of each other.
    ///
    /// The first call switches the medium from full connectivity to the
    /// explicit link set.
    pub fn link(&self, a: NodeId, b: NodeId) -> Result<(), TransportError> {
        let mut inner = self.lock()?;
        let links = inner.links.get_or_insert_with(HashSet::new);
        links.insert((a, b));
        links.insert((b, a));
        Ok(())
    }

    /// Creates an unattached transport for station `id`
    pub fn transport(&self, id: NodeId) -> MediumTransport {
        MediumTransport {
            id,
            medium: self.clone(),
            status: None,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MediumInner>, TransportError> {
        self.inner
            .lock()
            .map_err(|_| TransportError::Io("radio medium lock poisoned".into()))
    }

    fn attach(&self, id: NodeId, sink: InboundSink) -> Result<(), TransportError> {
        self.lock()?.stations.insert(id, sink);
        Ok(())
    }

    fn transmit(&self, from: NodeId, destination: Destination, frame: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock()?;
        let rssi = inner.signal_strength;

        match destination {
            Destination::Broadcast => {
                let receivers: Vec<(NodeId, InboundSink)> = inner
                    .stations
                    .iter()
                    .filter(|(id, _)| inner.in_range(from, **id))
                    .map(|(id, sink)| (*id, sink.clone()))
                    .collect();
                for (id, sink) in receivers {
                    if inner.lost() {
                        trace!(%from, to = %id, "broadcast copy lost");
                        continue;
                    }
                    // A full or closed receiver drops its copy; broadcasts are never acknowledged
                    let _ = sink.deliver(from, frame, rssi);
                }
                Ok(())
            }

            Destination::Unicast(to) => {
                if !inner.in_range(from, to) {
                    return Err(TransportError::NoAck);
                }
                let Some(sink) = inner.stations.get(&to).cloned() else {
                    return Err(TransportError::NoAck);
                };
                if inner.lost() {
                    trace!(%from, %to, "unicast lost");
                    return Err(TransportError::NoAck);
                }
                match sink.deliver(from, frame, rssi) {
                    Err(Error::Transport(TransportError::Closed)) => Err(TransportError::NoAck),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Transport attaching one station to a [`RadioMedium`]
pub struct MediumTransport {
    id: NodeId,
    medium: RadioMedium,
    status: Option<SendStatusSink>,
}

impl MediumTransport {
    /// Station address
    pub fn id(&self) -> NodeId {
        self.id
    }
}

#[async_trait]
impl Transport for MediumTransport {
    async fn send(&self, destination: Destination, frame: Bytes) -> Result<(), TransportError> {
        let status = self.status.as_ref().ok_or(TransportError::NotRegistered)?;
        let outcome = self.medium.transmit(self.id, destination, &frame);
        status.report(destination, outcome);
        Ok(())
    }

    fn register(&mut self, hooks: TransportHooks) -> Result<(), TransportError> {
        self.medium.attach(self.id, hooks.on_receive)?;
        self.status = Some(hooks.on_send_status);
        Ok(())
    }
}
