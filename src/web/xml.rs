//! Hand-built CAS 2.0 response XML. The protocol's wire format is small and fixed enough that a
//! templating crate buys nothing over `format!` — this mirrors how the teacher's own
//! `CasValidationResponse::to_xml` is written, just against the correct `cas` namespace.

use crate::services::cas_service::ValidationOutcome;
use crate::services::validator::ValidatorError;
use crate::storage::UserAttribute;

const CAS_NAMESPACE: &str = "http://www.yale.edu/tp/cas";

pub fn service_validate_response(outcome: &ValidationOutcome) -> String {
    match outcome {
        ValidationOutcome::Success {
            user,
            attributes,
            proxy_granting_ticket,
            proxies,
        } => authentication_success(user, attributes, proxy_granting_ticket.as_deref(), proxies),
        ValidationOutcome::Failure(err) => authentication_failure(*err),
    }
}

fn authentication_success(
    user: &str,
    attributes: &[UserAttribute],
    proxy_granting_ticket: Option<&str>,
    proxies: &[String],
) -> String {
    let mut body = format!(
        "    <cas:authenticationSuccess>\n      <cas:user>{}</cas:user>\n",
        escape(user)
    );

    if let Some(pgt_iou) = proxy_granting_ticket {
        body.push_str(&format!(
            "      <cas:proxyGrantingTicket>{}</cas:proxyGrantingTicket>\n",
            escape(pgt_iou)
        ));
    }

    if !attributes.is_empty() {
        body.push_str("      <cas:attributes>\n");
        for attribute in attributes {
            body.push_str(&format!(
                "        <cas:{}>{}</cas:{}>\n",
                escape(&attribute.attribute_name),
                escape(&attribute.attribute_value),
                escape(&attribute.attribute_name)
            ));
        }
        body.push_str("      </cas:attributes>\n");
    }

    if !proxies.is_empty() {
        body.push_str("      <cas:proxies>\n");
        for proxy in proxies {
            body.push_str(&format!("        <cas:proxy>{}</cas:proxy>\n", escape(proxy)));
        }
        body.push_str("      </cas:proxies>\n");
    }

    body.push_str("    </cas:authenticationSuccess>\n");
    wrap(&body)
}

fn authentication_failure(err: ValidatorError) -> String {
    let message = match err {
        ValidatorError::InvalidTicket => "ticket not recognized",
        ValidatorError::InvalidService => "service mismatch",
        ValidatorError::InternalError => "internal error validating ticket",
    };
    authentication_failure_response(err.cas2_code(), message)
}

/// Used directly (rather than through `ValidatorError`) for failures the Validator never sees,
/// such as a missing `service`/`ticket` query parameter (`INVALID_REQUEST`).
pub fn authentication_failure_response(code: &str, message: &str) -> String {
    let body = format!(
        "    <cas:authenticationFailure code=\"{}\">{}</cas:authenticationFailure>\n",
        escape(code),
        escape(message)
    );
    wrap(&body)
}

pub fn proxy_success_response(proxy_ticket: &str) -> String {
    let body = format!(
        "    <cas:proxySuccess>\n      <cas:proxyTicket>{}</cas:proxyTicket>\n    </cas:proxySuccess>\n",
        escape(proxy_ticket)
    );
    wrap(&body)
}

pub fn proxy_failure_response(code: &str, message: &str) -> String {
    let body = format!(
        "    <cas:proxyFailure code=\"{}\">{}</cas:proxyFailure>\n",
        escape(code),
        escape(message)
    );
    wrap(&body)
}

fn wrap(body: &str) -> String {
    format!("<cas:serviceResponse xmlns:cas=\"{CAS_NAMESPACE}\">\n{body}</cas:serviceResponse>\n")
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_uses_the_yale_namespace() {
        let outcome = ValidationOutcome::Success {
            user: "ellen".to_string(),
            attributes: vec![],
            proxy_granting_ticket: None,
            proxies: vec![],
        };
        let xml = service_validate_response(&outcome);
        assert!(xml.contains("xmlns:cas=\"http://www.yale.edu/tp/cas\""));
        assert!(xml.contains("<cas:user>ellen</cas:user>"));
    }

    #[test]
    fn proxy_chain_is_rendered_most_recent_first() {
        let outcome = ValidationOutcome::Success {
            user: "ellen".to_string(),
            attributes: vec![],
            proxy_granting_ticket: None,
            proxies: vec!["http://ww2.example.com/".to_string(), "http://www.example.com/".to_string()],
        };
        let xml = service_validate_response(&outcome);
        let first = xml.find("ww2.example.com").unwrap();
        let second = xml.find("www.example.com").unwrap();
        assert!(first < second);
    }

    #[test]
    fn failure_response_carries_the_invalid_ticket_code() {
        let outcome = ValidationOutcome::Failure(ValidatorError::InvalidTicket);
        let xml = service_validate_response(&outcome);
        assert!(xml.contains("code=\"INVALID_TICKET\""));
    }

    #[test]
    fn invalid_request_is_wrapped_as_an_authentication_failure_not_a_proxy_failure() {
        let xml = authentication_failure_response("INVALID_REQUEST", "missing parameters");
        assert!(xml.contains("<cas:serviceResponse"));
        assert!(xml.contains("<cas:authenticationFailure code=\"INVALID_REQUEST\">"));
        assert!(!xml.contains("proxyFailure"));
    }

    #[test]
    fn username_is_escaped() {
        let outcome = ValidationOutcome::Success {
            user: "<script>".to_string(),
            attributes: vec![],
            proxy_granting_ticket: None,
            proxies: vec![],
        };
        let xml = service_validate_response(&outcome);
        assert!(!xml.contains("<script>"));
        assert!(xml.contains("&lt;script&gt;"));
    }
}
