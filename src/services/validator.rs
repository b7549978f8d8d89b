use lazy_regex::regex;

use crate::storage::{ProxyGrantingTicket, ProxyTicket, ServiceTicket, TicketStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireKind {
    StOnly,
    StOrPt,
}

#[derive(Debug, Clone)]
pub enum ValidatedTicket {
    St(ServiceTicket),
    /// A successfully validated proxy ticket, plus its resolved proxy chain in
    /// most-recent-first order (§4.3).
    Pt(ProxyTicket, Vec<String>),
}

/// The wire-visible failure taxonomy from SPEC_FULL.md §7, independent of whether the caller
/// is CAS 1.0 (collapses everything to `no\n\n`) or CAS 2.0 (keeps the distinct codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorError {
    InvalidTicket,
    InvalidService,
    InternalError,
}

impl ValidatorError {
    pub fn cas2_code(&self) -> &'static str {
        match self {
            ValidatorError::InvalidTicket => "INVALID_TICKET",
            ValidatorError::InvalidService => "INVALID_SERVICE",
            ValidatorError::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Resolves a presented ticket identifier against the requested service, atomically consuming
/// it when every precondition holds. See SPEC_FULL.md §4.3 for the exact six-step algorithm this
/// mirrors.
#[derive(Clone)]
pub struct Validator {
    store: TicketStore,
}

impl Validator {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }

    pub async fn validate(
        &self,
        ticket_id: &str,
        service: &str,
        require_kind: RequireKind,
    ) -> Result<ValidatedTicket, ValidatorError> {
        let prefix = ticket_prefix(ticket_id, require_kind).ok_or(ValidatorError::InvalidTicket)?;

        match prefix {
            TicketPrefix::St => self.validate_st(ticket_id, service).await,
            TicketPrefix::Pt => self.validate_pt(ticket_id, service).await,
        }
    }

    async fn validate_st(
        &self,
        ticket_id: &str,
        service: &str,
    ) -> Result<ValidatedTicket, ValidatorError> {
        let ticket = self
            .store
            .get_st(ticket_id)
            .await
            .map_err(|_| ValidatorError::InternalError)?
            .ok_or(ValidatorError::InvalidTicket)?;

        if !services_match(&ticket.service, service) {
            return Err(ValidatorError::InvalidService);
        }

        let consumed = self
            .store
            .consume_st(ticket_id)
            .await
            .map_err(|_| ValidatorError::InternalError)?
            .ok_or(ValidatorError::InvalidTicket)?;

        Ok(ValidatedTicket::St(consumed))
    }

    async fn validate_pt(
        &self,
        ticket_id: &str,
        service: &str,
    ) -> Result<ValidatedTicket, ValidatorError> {
        let ticket = self
            .store
            .get_pt(ticket_id)
            .await
            .map_err(|_| ValidatorError::InternalError)?
            .ok_or(ValidatorError::InvalidTicket)?;

        if !services_match(&ticket.service, service) {
            return Err(ValidatorError::InvalidService);
        }

        let consumed = self
            .store
            .consume_pt(ticket_id)
            .await
            .map_err(|_| ValidatorError::InternalError)?
            .ok_or(ValidatorError::InvalidTicket)?;

        let proxies = self
            .resolve_proxy_chain(&consumed)
            .await
            .map_err(|_| ValidatorError::InternalError)?;

        Ok(ValidatedTicket::Pt(consumed, proxies))
    }

    /// Walks `pt.granted_by_pgt.granted_by → …` up to the root ST, recording the service of
    /// every proxy ticket found along the way. The validated ticket's own service is the first
    /// entry; the chain is already in most-recent-first order by construction.
    async fn resolve_proxy_chain(&self, pt: &ProxyTicket) -> Result<Vec<String>, crate::common::ApiError> {
        let mut proxies = vec![pt.service.clone()];
        let mut current_pgt: Option<ProxyGrantingTicket> = self.store.get_pgt(&pt.granted_by_pgt).await?;

        while let Some(pgt) = current_pgt {
            match &pgt.granted_by_pt {
                Some(parent_pt_id) => {
                    let parent_pt = self.store.get_pt(parent_pt_id).await?;
                    match parent_pt {
                        Some(parent_pt) => {
                            proxies.push(parent_pt.service.clone());
                            current_pgt = self.store.get_pgt(&parent_pt.granted_by_pgt).await?;
                        }
                        None => break,
                    }
                }
                None => break, // granted_by_st: reached the root.
            }
        }

        Ok(proxies)
    }
}

enum TicketPrefix {
    St,
    Pt,
}

fn ticket_prefix(ticket_id: &str, require_kind: RequireKind) -> Option<TicketPrefix> {
    let st_re = regex!(r"^ST-[0-9]{10}-[A-Za-z0-9]{32}$");
    let pt_re = regex!(r"^PT-[0-9]{10}-[A-Za-z0-9]{32}$");

    if st_re.is_match(ticket_id) {
        return Some(TicketPrefix::St);
    }
    if require_kind == RequireKind::StOrPt && pt_re.is_match(ticket_id) {
        return Some(TicketPrefix::Pt);
    }
    None
}

/// Strips a single trailing `/` from both sides, then compares case-sensitively. Query strings
/// are preserved and compared literally (SPEC_FULL.md §4.3 / §9).
fn services_match(stored: &str, presented: &str) -> bool {
    stored.strip_suffix('/').unwrap_or(stored) == presented.strip_suffix('/').unwrap_or(presented)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_match_ignores_a_single_trailing_slash() {
        assert!(services_match("http://www.example.com/", "http://www.example.com"));
        assert!(services_match("http://www.example.com", "http://www.example.com/"));
        assert!(!services_match("http://www.example.com/", "http://www.example.org/"));
    }

    #[test]
    fn services_match_compares_query_strings_literally() {
        assert!(!services_match(
            "http://www.example.com/?a=1",
            "http://www.example.com/?a=2"
        ));
    }

    #[test]
    fn services_match_strips_only_a_single_trailing_slash() {
        assert!(!services_match("http://www.example.com//", "http://www.example.com/"));
        assert!(!services_match("http://www.example.com//", "http://www.example.com"));
    }

    #[test]
    fn malformed_ticket_id_has_no_prefix() {
        assert!(ticket_prefix("not-a-ticket", RequireKind::StOrPt).is_none());
        assert!(ticket_prefix("PT-0000000000-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", RequireKind::StOnly)
            .is_none());
    }
}
