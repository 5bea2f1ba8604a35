use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Error, ErrorKind};

/// The outcome of a single RPC issued by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The operation, e.g. `CloudSpanner.ExecuteStreamingSql`.
    pub name: &'static str,
    pub sql: Option<String>,
    pub elapsed: Duration,
    /// The kind of error the operation failed with, if any.
    pub outcome: Result<(), ErrorKind>,
}

/// Receives an [`Event`] after each RPC completes; see [`crate::ConfigBuilder::observer`].
pub trait Observer: Send + Sync {
    fn observe(&self, event: &Event);
}

impl<F> Observer for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn observe(&self, event: &Event) {
        self(event)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    observer: Option<Arc<dyn Observer>>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Telemetry {
    pub(crate) fn new(observer: Option<Arc<dyn Observer>>) -> Self {
        Self { observer }
    }

    pub(crate) fn start(&self) -> Instant {
        Instant::now()
    }

    pub(crate) fn record<T>(
        &self,
        name: &'static str,
        sql: Option<&str>,
        started: Instant,
        result: &Result<T, Error>,
    ) {
        let elapsed = started.elapsed();
        match result {
            Ok(_) => log::debug!("{} completed in {:?}", name, elapsed),
            Err(err) => log::debug!("{} failed in {:?}: {}", name, elapsed, err),
        }
        if let Some(observer) = &self.observer {
            observer.observe(&Event {
                name,
                sql: sql.map(str::to_string),
                elapsed,
                outcome: result.as_ref().map(|_| ()).map_err(Error::kind),
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_observer_receives_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let telemetry = Telemetry::new(Some(Arc::new(move |event: &Event| {
            sink.lock().unwrap().push(event.clone())
        })));

        let started = telemetry.start();
        telemetry.record::<()>("CloudSpanner.Commit", None, started, &Ok(()));
        telemetry.record::<()>(
            "CloudSpanner.ExecuteUpdate",
            Some("UPDATE t SET a = 1 WHERE 1=1"),
            started,
            &Err(Error::Integrity("duplicate".into())),
        );

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "CloudSpanner.Commit");
        assert_eq!(events[0].outcome, Ok(()));
        assert_eq!(events[1].sql.as_deref(), Some("UPDATE t SET a = 1 WHERE 1=1"));
        assert_eq!(events[1].outcome, Err(ErrorKind::Integrity));
    }
}
