//! In-flight request map.
//!
//! At most one record exists per key. The record holds a shared future every
//! caller of that key awaits, and is removed by the producer task itself
//! right before the future resolves.

use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, Shared};

use crate::cache::ErasedValue;
use crate::error::OrchestratorError;

/// How an in-flight request settled.
#[derive(Clone)]
pub(crate) enum Settled {
    Value(ErasedValue),
    Degraded,
}

pub(crate) type FlightFuture = Shared<BoxFuture<'static, Result<Settled, OrchestratorError>>>;

struct Flight {
    id: u64,
    type_id: TypeId,
    type_name: &'static str,
    future: FlightFuture,
}

/// Outcome of [`FlightMap::join_or_lead`].
pub(crate) enum Claim<R> {
    /// A fresh cache entry appeared before a new flight was needed.
    Cached(R),
    /// Another caller's request is already running.
    Joined(FlightFuture),
    /// This caller started the request.
    Led(FlightFuture),
}

#[derive(Default)]
pub(crate) struct FlightMap {
    flights: DashMap<String, Flight>,
    next_id: AtomicU64,
}

impl FlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key` or start one.
    ///
    /// While the key's slot is locked, `recheck` gets one more look at the
    /// cache: a flight that settled between the caller's cache miss and this
    /// call has already written its result there. `lead` receives the new
    /// flight id and must return the shared future to register.
    pub fn join_or_lead<T, R>(
        &self,
        key: &str,
        recheck: impl FnOnce() -> Option<R>,
        lead: impl FnOnce(u64) -> FlightFuture,
    ) -> Result<Claim<R>, OrchestratorError>
    where
        T: 'static,
    {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let flight = occupied.get();
                if flight.type_id != TypeId::of::<T>() {
                    return Err(OrchestratorError::TypeMismatch {
                        key: key.to_string(),
                        expected: std::any::type_name::<T>(),
                        in_flight: flight.type_name,
                    });
                }
                Ok(Claim::Joined(flight.future.clone()))
            }
            Entry::Vacant(vacant) => {
                if let Some(cached) = recheck() {
                    return Ok(Claim::Cached(cached));
                }

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let future = lead(id);
                vacant.insert(Flight {
                    id,
                    type_id: TypeId::of::<T>(),
                    type_name: std::any::type_name::<T>(),
                    future: future.clone(),
                });
                Ok(Claim::Led(future))
            }
        }
    }

    /// Remove the flight `id` for `key`. A newer flight under the same key
    /// is left alone.
    pub fn finish(&self, key: &str, id: u64) {
        self.flights.remove_if(key, |_, flight| flight.id == id);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flights.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;

    fn ready(value: u32) -> FlightFuture {
        let settled: Result<Settled, OrchestratorError> = Ok(Settled::Value(Arc::new(value)));
        futures::future::ready(settled).boxed().shared()
    }

    #[test]
    fn test_second_claim_joins() {
        let flights = FlightMap::new();

        let first = flights.join_or_lead::<u32, ()>("k", || None, |_| ready(1)).unwrap();
        assert!(matches!(first, Claim::Led(_)));

        let second = flights
            .join_or_lead::<u32, ()>("k", || None, |_| panic!("must not lead twice"))
            .unwrap();
        assert!(matches!(second, Claim::Joined(_)));
        assert_eq!(flights.len(), 1);
    }

    #[test]
    fn test_recheck_short_circuits() {
        let flights = FlightMap::new();
        let claim = flights
            .join_or_lead::<u32, u32>("k", || Some(9), |_| panic!("cached value wins"))
            .unwrap();
        assert!(matches!(claim, Claim::Cached(9)));
        assert!(!flights.contains("k"));
    }

    #[test]
    fn test_type_mismatch_on_join() {
        let flights = FlightMap::new();
        flights.join_or_lead::<u32, ()>("k", || None, |_| ready(1)).unwrap();

        let err = flights
            .join_or_lead::<String, ()>("k", || None, |_| ready(2))
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::TypeMismatch { .. }));
    }

    #[test]
    fn test_finish_ignores_stale_ids() {
        let flights = FlightMap::new();
        let mut led_id = None;
        flights
            .join_or_lead::<u32, ()>("k", || None, |id| {
                led_id = Some(id);
                ready(1)
            })
            .unwrap();
        let id = led_id.unwrap();

        flights.finish("k", id + 1);
        assert!(flights.contains("k"));
        flights.finish("k", id);
        assert!(!flights.contains("k"));
    }
}
