use crate::common::config::CasConfig;
use crate::services::proxy_callback::ProxyCallbackClient;
use crate::services::ticket_factory::{new_identifier, new_ticket_with_retry};
use crate::services::validator::{RequireKind, ValidatedTicket, Validator, ValidatorError};
use crate::storage::{ProxyTicket, TicketGrantingTicket, TicketStore, UserAttribute};

/// Outcome of a ServiceValidate / ProxyValidate attempt, already shaped for the XML builders in
/// `web::xml` — it never leaks a raw `ValidatorError` past this layer.
pub enum ValidationOutcome {
    Success {
        user: String,
        attributes: Vec<UserAttribute>,
        proxy_granting_ticket: Option<String>,
        proxies: Vec<String>,
    },
    Failure(ValidatorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyError {
    BadPgt,
    InternalError,
}

/// The ticket subsystem's front door: combines the Store, the Factory, the Validator and the
/// Proxy Callback Client into the handful of operations the Protocol Endpoints need (§4.2-§4.4).
#[derive(Clone)]
pub struct CasService {
    store: TicketStore,
    validator: Validator,
    callback: ProxyCallbackClient,
    config: CasConfig,
}

impl CasService {
    pub fn new(store: TicketStore, config: CasConfig) -> Self {
        let validator = Validator::new(store.clone());
        let callback = ProxyCallbackClient::new(config.proxy_callback_timeout_seconds);
        Self {
            store,
            validator,
            callback,
            config,
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    // ----- Login / Logout --------------------------------------------------------------------

    pub async fn issue_tgt(&self, user_id: &str) -> Result<TicketGrantingTicket, crate::common::ApiError> {
        new_ticket_with_retry("TGT", |ticket| {
            self.store.insert_tgt(&ticket, user_id, self.config.tgt_validity_seconds)
        })
        .await
    }

    pub async fn logout(&self, tgt: &str) -> Result<bool, crate::common::ApiError> {
        self.store.invalidate_tgt(tgt).await
    }

    /// Issues a Service Ticket for a service redirect, either from an active SSO session
    /// (`granted_by_tgt` set) or a fresh primary-credential login (`granted_by_tgt` is still set,
    /// since SPEC_FULL.md requires every ST trace back to a TGT — there is no credential-only ST).
    pub async fn issue_st(
        &self,
        user_id: &str,
        service: &str,
        granted_by_tgt: &str,
    ) -> Result<String, crate::common::ApiError> {
        let record = new_ticket_with_retry("ST", |ticket| {
            self.store.insert_st(
                &ticket,
                user_id,
                service,
                Some(granted_by_tgt),
                self.config.ticket_validity_seconds,
            )
        })
        .await?;
        Ok(record.ticket)
    }

    // ----- Validate (CAS 1.0) ----------------------------------------------------------------

    /// Returns the authenticated username on success, `None` on any failure — CAS 1.0 never
    /// distinguishes failure reasons (`no\n\n`, per §6).
    pub async fn validate_cas1(&self, ticket: &str, service: &str) -> Option<String> {
        match self.validator.validate(ticket, service, RequireKind::StOnly).await {
            Ok(ValidatedTicket::St(st)) => Some(st.user_id),
            _ => None,
        }
    }

    // ----- ServiceValidate / ProxyValidate (CAS 2.0) -----------------------------------------

    pub async fn service_validate(
        &self,
        ticket: &str,
        service: &str,
        pgt_url: Option<&str>,
    ) -> ValidationOutcome {
        self.validate_and_issue_pgt(ticket, service, pgt_url, RequireKind::StOnly).await
    }

    pub async fn proxy_validate(
        &self,
        ticket: &str,
        service: &str,
        pgt_url: Option<&str>,
    ) -> ValidationOutcome {
        self.validate_and_issue_pgt(ticket, service, pgt_url, RequireKind::StOrPt).await
    }

    async fn validate_and_issue_pgt(
        &self,
        ticket: &str,
        service: &str,
        pgt_url: Option<&str>,
        require_kind: RequireKind,
    ) -> ValidationOutcome {
        let (user, proxies) = match self.validator.validate(ticket, service, require_kind).await {
            Ok(ValidatedTicket::St(st)) => (st.user_id, Vec::new()),
            Ok(ValidatedTicket::Pt(pt, proxies)) => (pt.user_id, proxies),
            Err(err) => return ValidationOutcome::Failure(err),
        };

        let attributes = self.store.get_user_attributes(&user).await.unwrap_or_default();

        let granted_by_st = if proxies.is_empty() { Some(ticket) } else { None };
        let granted_by_pt = if proxies.is_empty() { None } else { Some(ticket) };
        let proxy_granting_ticket = match pgt_url {
            Some(url) => self.try_issue_pgt(&user, service, url, granted_by_st, granted_by_pt).await,
            None => None,
        };

        ValidationOutcome::Success {
            user,
            attributes,
            proxy_granting_ticket,
            proxies,
        }
    }

    /// Runs the proxy callback handshake and, only on success, records the PGT. Returns the
    /// PGTIOU to embed in the validation response, or `None` if the handshake was skipped or
    /// failed — in neither case is this treated as a validation failure (§4.4).
    async fn try_issue_pgt(
        &self,
        user_id: &str,
        service: &str,
        pgt_url: &str,
        granted_by_st: Option<&str>,
        granted_by_pt: Option<&str>,
    ) -> Option<String> {
        // A registered service may opt out of the https-only rule; an unregistered service (or
        // one that didn't match any pattern) falls back to the strict default (§4.4 step 1).
        let require_secure = self
            .store
            .get_service_by_url(service)
            .await
            .ok()
            .flatten()
            .map(|registration| registration.require_secure)
            .unwrap_or(true);

        if require_secure && !ProxyCallbackClient::is_https(pgt_url) {
            return None;
        }

        let pgt_id = new_identifier("PGT");
        let pgt_iou = new_identifier("PGTIOU");

        if !self.callback.deliver(pgt_url, &pgt_id, &pgt_iou).await {
            return None;
        }

        self.store
            .insert_pgt(
                &pgt_id,
                &pgt_iou,
                user_id,
                service,
                Some(pgt_url),
                granted_by_st,
                granted_by_pt,
                self.config.pgt_validity_seconds,
            )
            .await
            .ok()
            .map(|record| record.iou)
    }

    // ----- Proxy (CAS 2.0) -------------------------------------------------------------------

    pub async fn proxy(&self, pgt: &str, target_service: &str) -> Result<ProxyTicket, ProxyError> {
        let record = self
            .store
            .get_pgt(pgt)
            .await
            .map_err(|_| ProxyError::InternalError)?
            .ok_or(ProxyError::BadPgt)?;

        if record.expires_at <= chrono::Utc::now() {
            return Err(ProxyError::BadPgt);
        }

        new_ticket_with_retry("PT", |ticket| {
            self.store.insert_pt(
                &ticket,
                &record.user_id,
                target_service,
                pgt,
                self.config.ticket_validity_seconds,
            )
        })
        .await
        .map_err(|_| ProxyError::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_outcome_success_preserves_proxies_order() {
        let outcome = ValidationOutcome::Success {
            user: "ellen".to_string(),
            attributes: vec![],
            proxy_granting_ticket: None,
            proxies: vec!["http://ww2.example.com/".to_string(), "http://www.example.com/".to_string()],
        };
        match outcome {
            ValidationOutcome::Success { proxies, .. } => {
                assert_eq!(proxies[0], "http://ww2.example.com/");
                assert_eq!(proxies[1], "http://www.example.com/");
            }
            ValidationOutcome::Failure(_) => panic!("expected success"),
        }
    }
}
