//! The client cache (spec §4.7): a bounded map from endpoint to idle
//! connected clients, evicted by strict LRU over individual entries —
//! not over endpoints — so a burst of traffic to one endpoint can push
//! out an idle connection to an unrelated one.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::buffer::{BoundInbuf, BoundOutbuf};
use crate::net::Endpoint;

/// One idle, previously-used connection: its bound buffers, ready to
/// have a request written and a reply read.
pub struct NbClient {
    pub endpoint: Endpoint,
    pub inbuf: BoundInbuf,
    pub outbuf: BoundOutbuf,
}

impl NbClient {
    pub fn new(endpoint: Endpoint, inbuf: BoundInbuf, outbuf: BoundOutbuf) -> Self {
        NbClient { endpoint, inbuf, outbuf }
    }
}

/// Most-recently-used entries live at the front. `obtain` scans from
/// the front for the first match; `store` pushes a fresh entry at the
/// front and drops from the back when over capacity.
pub struct NbClientCache {
    capacity: usize,
    entries: VecDeque<Rc<NbClient>>,
}

impl NbClientCache {
    pub fn new(capacity: usize) -> Self {
        NbClientCache { capacity, entries: VecDeque::new() }
    }

    /// Removes and returns the most-recently-used idle client for
    /// `endpoint`, if any.
    pub fn obtain(&mut self, endpoint: Endpoint) -> Option<Rc<NbClient>> {
        let pos = self.entries.iter().position(|c| c.endpoint == endpoint)?;
        self.entries.remove(pos)
    }

    /// Returns a client to the cache as the most-recently-used entry,
    /// evicting the globally least-recently-used entry if this pushes
    /// the cache over capacity.
    pub fn store(&mut self, client: Rc<NbClient>) {
        self.entries.push_front(client);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Drops every cached client for `endpoint` — called after an RPC
    /// failure, since a broken connection to that endpoint must not be
    /// handed out to a later caller.
    pub fn invalidate_entries(&mut self, endpoint: Endpoint) {
        self.entries.retain(|c| c.endpoint != endpoint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{NbInbuf, NbOutbuf};
    use crate::net::TcpConnection;
    use crate::scheduler::Scheduler;
    use std::net::{TcpListener, TcpStream};

    fn loopback_client(scheduler: &Scheduler, endpoint: Endpoint) -> Rc<NbClient> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        stream.set_nonblocking(true).unwrap();
        let conn =
            TcpConnection::from_mio(mio::net::TcpStream::from_std(stream), endpoint);
        let conn2 = conn.try_clone().unwrap();
        let inbuf = NbInbuf::new(scheduler, conn, 256, None).unwrap();
        let outbuf = NbOutbuf::new(scheduler, conn2, 256, None).unwrap();
        Rc::new(NbClient::new(
            endpoint,
            BoundInbuf::new(inbuf, scheduler.clone()),
            BoundOutbuf::new(outbuf, scheduler.clone()),
        ))
    }

    #[test]
    fn store_then_obtain_round_trips_the_most_recent_entry() {
        let scheduler = Scheduler::new().unwrap();
        let endpoint = Endpoint::new("127.0.0.1:9000".parse().unwrap());
        let mut cache = NbClientCache::new(4);
        let client = loopback_client(&scheduler, endpoint);
        cache.store(client);
        assert_eq!(cache.len(), 1);
        assert!(cache.obtain(endpoint).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn over_capacity_evicts_the_least_recently_used_entry() {
        let scheduler = Scheduler::new().unwrap();
        let a = Endpoint::new("127.0.0.1:9001".parse().unwrap());
        let b = Endpoint::new("127.0.0.1:9002".parse().unwrap());
        let c = Endpoint::new("127.0.0.1:9003".parse().unwrap());
        let mut cache = NbClientCache::new(2);
        cache.store(loopback_client(&scheduler, a));
        cache.store(loopback_client(&scheduler, b));
        cache.store(loopback_client(&scheduler, c));
        assert_eq!(cache.len(), 2);
        assert!(cache.obtain(a).is_none());
        assert!(cache.obtain(b).is_some());
        assert!(cache.obtain(c).is_some());
    }

    #[test]
    fn invalidate_entries_drops_only_the_matching_endpoint() {
        let scheduler = Scheduler::new().unwrap();
        let a = Endpoint::new("127.0.0.1:9004".parse().unwrap());
        let b = Endpoint::new("127.0.0.1:9005".parse().unwrap());
        let mut cache = NbClientCache::new(4);
        cache.store(loopback_client(&scheduler, a));
        cache.store(loopback_client(&scheduler, b));
        cache.invalidate_entries(a);
        assert_eq!(cache.len(), 1);
        assert!(cache.obtain(a).is_none());
        assert!(cache.obtain(b).is_some());
    }
}
