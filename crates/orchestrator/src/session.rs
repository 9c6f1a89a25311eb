use sandbox_core::{Result, SandboxError, Subsystem, SubsystemHandle, TeardownFailure};
use tracing::{debug, info, warn};

/// What a call to [`SandboxSession::close`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { handles: usize },
    AlreadyClosed,
}

/// Handles of every subsystem that started, in start order.
///
/// A session may be partial: it only ever closes what it holds.
pub struct SandboxSession {
    port: u16,
    handles: Vec<Box<dyn SubsystemHandle>>,
    warnings: Vec<String>,
    closed: bool,
}

impl SandboxSession {
    pub fn new(port: u16, handles: Vec<Box<dyn SubsystemHandle>>) -> Self {
        Self {
            port,
            handles,
            warnings: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Port the HTTP gateway listens on.
    ///
    /// Prefers the port the gateway actually bound, which differs from the
    /// resolved one when the run asked for an ephemeral port (0).
    pub fn port(&self) -> u16 {
        self.handles
            .iter()
            .find(|h| h.subsystem() == Subsystem::HttpGateway)
            .and_then(|h| h.local_port())
            .unwrap_or(self.port)
    }

    /// Port resolved from the options and environment.
    pub fn resolved_port(&self) -> u16 {
        self.port
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn subsystems(&self) -> Vec<Subsystem> {
        self.handles.iter().map(|h| h.subsystem()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_live()).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close every held handle in reverse start order.
    ///
    /// Every handle is attempted even after a failure; the failures are
    /// reported together as [`SandboxError::TeardownFailed`]. A second call
    /// touches nothing and returns [`CloseOutcome::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<CloseOutcome> {
        if self.closed {
            debug!("Sandbox session already closed");
            return Ok(CloseOutcome::AlreadyClosed);
        }
        self.closed = true;

        let mut failures = Vec::new();
        for handle in self.handles.iter_mut().rev() {
            let subsystem = handle.subsystem();
            match handle.close().await {
                Ok(()) => debug!(subsystem = %subsystem, "Subsystem closed"),
                Err(SandboxError::TeardownFailed(mut nested)) => failures.append(&mut nested),
                Err(e) => failures.push(TeardownFailure {
                    subsystem,
                    reason: e.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            info!(handles = self.handles.len(), "Sandbox shut down");
            Ok(CloseOutcome::Closed {
                handles: self.handles.len(),
            })
        } else {
            Err(SandboxError::TeardownFailed(failures))
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if !self.closed && !self.handles.is_empty() {
            warn!(
                handles = self.handles.len(),
                "Sandbox session dropped without being closed"
            );
        }
    }
}

impl std::fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxSession")
            .field("port", &self.port)
            .field("subsystems", &self.subsystems())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct FakeHandle {
        subsystem: Subsystem,
        fail: bool,
        live: bool,
        closed: Arc<Mutex<Vec<Subsystem>>>,
    }

    struct BoundGateway(u16);

    #[async_trait]
    impl SubsystemHandle for BoundGateway {
        fn subsystem(&self) -> Subsystem {
            Subsystem::HttpGateway
        }

        fn is_live(&self) -> bool {
            true
        }

        fn local_port(&self) -> Option<u16> {
            Some(self.0)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SubsystemHandle for FakeHandle {
        fn subsystem(&self) -> Subsystem {
            self.subsystem
        }

        fn is_live(&self) -> bool {
            self.live
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.lock().unwrap().push(self.subsystem);
            self.live = false;
            if self.fail {
                Err(SandboxError::Io(std::io::Error::other("stuck")))
            } else {
                Ok(())
            }
        }
    }

    fn session(specs: &[(Subsystem, bool)]) -> (SandboxSession, Arc<Mutex<Vec<Subsystem>>>) {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let handles = specs
            .iter()
            .map(|&(subsystem, fail)| {
                Box::new(FakeHandle {
                    subsystem,
                    fail,
                    live: true,
                    closed: closed.clone(),
                }) as Box<dyn SubsystemHandle>
            })
            .collect();
        (SandboxSession::new(3333, handles), closed)
    }

    #[tokio::test]
    async fn test_close_in_reverse_order() {
        let (mut session, closed) = session(&[
            (Subsystem::DataStore, false),
            (Subsystem::EventBus, false),
            (Subsystem::HttpGateway, false),
        ]);
        assert_eq!(session.live_count(), 3);

        let outcome = session.close().await.unwrap();

        assert_eq!(outcome, CloseOutcome::Closed { handles: 3 });
        assert_eq!(
            *closed.lock().unwrap(),
            vec![Subsystem::HttpGateway, Subsystem::EventBus, Subsystem::DataStore]
        );
        assert_eq!(session.live_count(), 0);
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let (mut session, closed) = session(&[(Subsystem::DataStore, false)]);

        session.close().await.unwrap();
        let second = session.close().await.unwrap();

        assert_eq!(second, CloseOutcome::AlreadyClosed);
        assert_eq!(closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_session_closes_only_what_it_holds() {
        let (mut session, closed) = session(&[(Subsystem::DataStore, false)]);

        session.close().await.unwrap();

        assert_eq!(*closed.lock().unwrap(), vec![Subsystem::DataStore]);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let (mut session, closed) = session(&[
            (Subsystem::DataStore, true),
            (Subsystem::EventBus, false),
            (Subsystem::HttpGateway, true),
        ]);

        let err = session.close().await.unwrap_err();

        assert_eq!(closed.lock().unwrap().len(), 3);
        match err {
            SandboxError::TeardownFailed(failures) => {
                let which: Vec<_> = failures.iter().map(|f| f.subsystem).collect();
                assert_eq!(which, vec![Subsystem::HttpGateway, Subsystem::DataStore]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_port_reports_the_bound_gateway_port() {
        let mut ephemeral = SandboxSession::new(0, vec![Box::new(BoundGateway(41234))]);
        assert_eq!(ephemeral.port(), 41234);
        assert_eq!(ephemeral.resolved_port(), 0);
        ephemeral.close().await.unwrap();

        let (mut fakes, _) = session(&[(Subsystem::HttpGateway, false)]);
        assert_eq!(fakes.port(), 3333);
        fakes.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_session() {
        let (mut session, _) = session(&[]);
        assert!(session.is_empty());

        let outcome = session.close().await.unwrap();
        assert_eq!(outcome, CloseOutcome::Closed { handles: 0 });
    }
}
