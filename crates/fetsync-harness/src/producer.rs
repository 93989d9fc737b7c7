#![forbid(unsafe_code)]

//! Explanation producer whose completions are released by the script.

use std::cell::RefCell;

use fetsync_runtime::{
    ExplanationProducer, ExplanationRequest, ExplanationSink, ResolveOutcome, SyncError,
};

use crate::error::{HarnessError, Result};

/// Parks every request under a ticket until [`DeferredProducer::release`].
#[derive(Debug, Default)]
pub struct DeferredProducer {
    tickets: RefCell<Vec<Ticket>>,
}

#[derive(Debug)]
struct Ticket {
    request: ExplanationRequest,
    sink: Option<ExplanationSink>,
}

impl DeferredProducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets issued so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.tickets.borrow().len()
    }

    /// Tickets not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.tickets
            .borrow()
            .iter()
            .filter(|ticket| ticket.sink.is_some())
            .count()
    }

    /// The request behind `ticket`.
    #[must_use]
    pub fn request(&self, ticket: usize) -> Option<ExplanationRequest> {
        self.tickets.borrow().get(ticket).map(|t| t.request)
    }

    /// Complete `ticket` with `text`.
    ///
    /// The outer error reports script mistakes; the inner result is the
    /// engine's verdict on the completion.
    pub fn release(
        &self,
        step: usize,
        ticket: usize,
        text: Option<String>,
    ) -> Result<std::result::Result<ResolveOutcome, SyncError>> {
        let sink = {
            let mut tickets = self.tickets.borrow_mut();
            let entry = tickets
                .get_mut(ticket)
                .ok_or(HarnessError::UnknownTicket { step, ticket })?;
            entry
                .sink
                .take()
                .ok_or(HarnessError::TicketAlreadyDelivered { step, ticket })?
        };
        // The borrow is released first: completing re-enters the engine.
        Ok(sink.complete(text))
    }
}

impl ExplanationProducer for DeferredProducer {
    fn request(&self, request: ExplanationRequest, sink: ExplanationSink) {
        tracing::debug!(
            ticket = self.issued(),
            index = request.index,
            generation = request.generation.get(),
            "explanation request parked"
        );
        self.tickets.borrow_mut().push(Ticket {
            request,
            sink: Some(sink),
        });
    }
}
