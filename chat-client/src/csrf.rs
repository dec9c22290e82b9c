//! Anti-forgery ticket manager.
//!
//! Holds at most one session ticket, bound to the bearer token it was
//! issued for. There is no expiry tracking: a ticket is used until the
//! server rejects it, at which point [`CsrfManager::run_mutation`] acquires
//! a fresh one and resends exactly once.

use crate::gateway::Gateway;
use chatify_core::{RetryDecision, TicketAttempt};
use chatify_types::{BearerToken, CsrfTicket, GatewayError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

struct HeldTicket {
    issued_for: BearerToken,
    ticket: CsrfTicket,
}

/// Acquires, caches and refreshes anti-forgery tickets.
pub struct CsrfManager<G: Gateway> {
    gateway: Arc<G>,
    held: Mutex<Option<HeldTicket>>,
}

impl<G: Gateway> CsrfManager<G> {
    /// Create a manager with no ticket.
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            held: Mutex::new(None),
        }
    }

    /// Obtain a one-off ticket for login or registration. Never cached.
    pub async fn acquire_anonymous(&self) -> Result<CsrfTicket, GatewayError> {
        self.gateway.acquire_anonymous_ticket().await
    }

    /// Return the held session ticket for `token`, acquiring one if needed.
    pub async fn acquire_session(&self, token: &BearerToken) -> Result<CsrfTicket, GatewayError> {
        {
            let held = self.held.lock().await;
            if let Some(held) = held.as_ref().filter(|h| &h.issued_for == token) {
                return Ok(held.ticket.clone());
            }
        }
        self.refresh(token).await
    }

    /// Acquire a fresh session ticket for `token` and replace the held one.
    pub async fn refresh(&self, token: &BearerToken) -> Result<CsrfTicket, GatewayError> {
        let ticket = self.gateway.acquire_session_ticket(token).await?;
        let mut held = self.held.lock().await;
        *held = Some(HeldTicket {
            issued_for: token.clone(),
            ticket: ticket.clone(),
        });
        tracing::debug!("acquired session ticket");
        Ok(ticket)
    }

    /// Forget the held ticket.
    pub async fn invalidate(&self) {
        *self.held.lock().await = None;
    }

    /// The held ticket, if any.
    pub async fn current(&self) -> Option<CsrfTicket> {
        self.held.lock().await.as_ref().map(|h| h.ticket.clone())
    }

    /// Run a mutating call with a session ticket.
    ///
    /// If the call is rejected because the ticket went stale, a fresh ticket
    /// is acquired and the call is made once more. A second rejection, or
    /// any other error, is returned as is.
    pub async fn run_mutation<T, F, Fut>(
        &self,
        token: &BearerToken,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(CsrfTicket) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = TicketAttempt::new();
        let mut ticket = self.acquire_session(token).await?;
        loop {
            let error = match call(ticket).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let (next, decision) = attempt.on_rejection(&error);
            attempt = next;
            match decision {
                RetryDecision::Reacquire => {
                    tracing::info!("ticket rejected as stale, reacquiring");
                    ticket = self.refresh(token).await?;
                }
                RetryDecision::Surface => {
                    if error.is_stale_ticket() {
                        self.invalidate().await;
                    }
                    tracing::debug!("mutation failed after {} send(s): {}", attempt.sends(), error);
                    return Err(error);
                }
            }
        }
    }
}

impl<G: Gateway> std::fmt::Debug for CsrfManager<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockGateway, Operation};
    use chatify_types::{AuthFailure, ConversationId};

    fn setup() -> (MockGateway, CsrfManager<MockGateway>) {
        let gateway = MockGateway::new();
        let manager = CsrfManager::new(Arc::new(gateway.clone()));
        (gateway, manager)
    }

    fn stale() -> GatewayError {
        GatewayError::Auth(AuthFailure::StaleTicket)
    }

    async fn send(
        gateway: &MockGateway,
        manager: &CsrfManager<MockGateway>,
        token: &BearerToken,
    ) -> Result<(), GatewayError> {
        let conv = ConversationId::new("c1");
        manager
            .run_mutation(token, |ticket| {
                let gateway = gateway.clone();
                let conv = conv.clone();
                let token = token.clone();
                async move {
                    gateway
                        .send_message(&token, &ticket, "hi", &conv)
                        .await
                        .map(|_| ())
                }
            })
            .await
    }

    // ===========================================
    // Acquisition Tests
    // ===========================================

    #[tokio::test]
    async fn session_ticket_is_reused() {
        let (gateway, manager) = setup();
        let token = BearerToken::new("t1");

        let first = manager.acquire_session(&token).await.unwrap();
        let second = manager.acquire_session(&token).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.count(Operation::SessionTicket), 1);
    }

    #[tokio::test]
    async fn ticket_is_bound_to_token() {
        let (gateway, manager) = setup();

        manager.acquire_session(&BearerToken::new("t1")).await.unwrap();
        manager.acquire_session(&BearerToken::new("t2")).await.unwrap();

        assert_eq!(gateway.count(Operation::SessionTicket), 2);
    }

    #[tokio::test]
    async fn anonymous_ticket_is_not_held() {
        let (_gateway, manager) = setup();

        manager.acquire_anonymous().await.unwrap();

        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_ticket() {
        let (_gateway, manager) = setup();
        let token = BearerToken::new("t1");

        let first = manager.acquire_session(&token).await.unwrap();
        let refreshed = manager.refresh(&token).await.unwrap();

        assert_ne!(first, refreshed);
        assert_eq!(manager.current().await, Some(refreshed));
    }

    #[tokio::test]
    async fn acquisition_failure_is_surfaced() {
        let (gateway, manager) = setup();
        gateway.fail_next(Operation::SessionTicket, GatewayError::Network("down".into()));

        let result = send(&gateway, &manager, &BearerToken::new("t1")).await;

        assert_eq!(result, Err(GatewayError::Network("down".into())));
        assert_eq!(gateway.count(Operation::SendMessage), 0);
    }

    // ===========================================
    // Retry Bound Tests
    // ===========================================

    #[tokio::test]
    async fn stale_ticket_retries_once() {
        let (gateway, manager) = setup();
        gateway.fail_next_send(stale());

        let result = send(&gateway, &manager, &BearerToken::new("t1")).await;

        assert!(result.is_ok());
        assert_eq!(gateway.count(Operation::SendMessage), 2);
        assert_eq!(gateway.count(Operation::SessionTicket), 2);
    }

    #[tokio::test]
    async fn second_stale_rejection_is_terminal() {
        let (gateway, manager) = setup();
        gateway.fail_next_send(stale());
        gateway.fail_next_send(stale());
        gateway.fail_next_send(stale());

        let result = send(&gateway, &manager, &BearerToken::new("t1")).await;

        assert_eq!(result, Err(stale()));
        assert_eq!(gateway.count(Operation::SendMessage), 2);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn network_error_is_not_retried() {
        let (gateway, manager) = setup();
        gateway.fail_next_send(GatewayError::Network("reset".into()));

        let result = send(&gateway, &manager, &BearerToken::new("t1")).await;

        assert!(matches!(result, Err(GatewayError::Network(_))));
        assert_eq!(gateway.count(Operation::SendMessage), 1);
    }

    #[tokio::test]
    async fn retry_uses_fresh_ticket() {
        let (gateway, manager) = setup();
        gateway.fail_next_send(stale());

        send(&gateway, &manager, &BearerToken::new("t1")).await.unwrap();

        let tickets: Vec<String> = gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                crate::gateway::GatewayCall::SendMessage { ticket, .. } => Some(ticket),
                _ => None,
            })
            .collect();
        assert_eq!(tickets, vec!["ticket-1", "ticket-2"]);
    }
}
