use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketGrantingTicket {
    pub ticket: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceTicket {
    pub ticket: String,
    pub user_id: String,
    pub service: String,
    pub granted_by_tgt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProxyTicket {
    pub ticket: String,
    pub user_id: String,
    pub service: String,
    pub granted_by_pgt: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProxyGrantingTicket {
    pub ticket: String,
    pub iou: String,
    pub user_id: String,
    pub service: String,
    pub pgt_url: Option<String>,
    pub granted_by_st: Option<String>,
    pub granted_by_pt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CasServiceRegistration {
    pub service_id: String,
    pub name: String,
    pub service_url_pattern: String,
    pub is_enabled: bool,
    pub require_secure: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServiceRequest {
    pub service_id: String,
    pub name: String,
    pub service_url_pattern: String,
    pub require_secure: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAttribute {
    pub user_id: String,
    pub attribute_name: String,
    pub attribute_value: String,
}

/// Per-kind storage for the four CAS ticket tables plus the service registry and the
/// user-attribute table. Every mutating method that models "consume" in the sense of §4.1 uses a
/// single conditional `UPDATE ... WHERE consumed_at IS NULL AND expires_at > now() RETURNING *`
/// so a concurrent double-validation of the same ticket succeeds for exactly one caller.
#[derive(Clone)]
pub struct TicketStore {
    pool: PgPool,
}

impl TicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----- Ticket-Granting Ticket ------------------------------------------------------------

    pub async fn insert_tgt(
        &self,
        ticket: &str,
        user_id: &str,
        validity_seconds: i64,
    ) -> Result<TicketGrantingTicket, ApiError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(validity_seconds);
        sqlx::query_as::<_, TicketGrantingTicket>(
            r#"
            INSERT INTO ticket_granting_tickets (ticket, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(ticket)
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_tgt(&self, ticket: &str) -> Result<Option<TicketGrantingTicket>, ApiError> {
        sqlx::query_as::<_, TicketGrantingTicket>(
            "SELECT * FROM ticket_granting_tickets WHERE ticket = $1",
        )
        .bind(ticket)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Marks a TGT consumed, ending the SSO session (called by Logout). Unlike ST/PT consume,
    /// this is not a single-use validation gate, so the affected-row count is not the point —
    /// logout is idempotent.
    pub async fn invalidate_tgt(&self, ticket: &str) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE ticket_granting_tickets SET consumed_at = $1 WHERE ticket = $2 AND consumed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(ticket)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ----- Service Ticket ----------------------------------------------------------------------

    pub async fn insert_st(
        &self,
        ticket: &str,
        user_id: &str,
        service: &str,
        granted_by_tgt: Option<&str>,
        validity_seconds: i64,
    ) -> Result<ServiceTicket, ApiError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(validity_seconds);
        sqlx::query_as::<_, ServiceTicket>(
            r#"
            INSERT INTO service_tickets (ticket, user_id, service, granted_by_tgt, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(ticket)
        .bind(user_id)
        .bind(service)
        .bind(granted_by_tgt)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_st(&self, ticket: &str) -> Result<Option<ServiceTicket>, ApiError> {
        sqlx::query_as::<_, ServiceTicket>("SELECT * FROM service_tickets WHERE ticket = $1")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// Atomic consume: returns `Some` exactly once across any number of concurrent callers.
    pub async fn consume_st(&self, ticket: &str) -> Result<Option<ServiceTicket>, ApiError> {
        sqlx::query_as::<_, ServiceTicket>(
            r#"
            UPDATE service_tickets
            SET consumed_at = $1
            WHERE ticket = $2 AND consumed_at IS NULL AND expires_at > $1
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(ticket)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    // ----- Proxy Ticket --------------------------------------------------------------------

    pub async fn insert_pt(
        &self,
        ticket: &str,
        user_id: &str,
        service: &str,
        granted_by_pgt: &str,
        validity_seconds: i64,
    ) -> Result<ProxyTicket, ApiError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(validity_seconds);
        sqlx::query_as::<_, ProxyTicket>(
            r#"
            INSERT INTO proxy_tickets (ticket, user_id, service, granted_by_pgt, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(ticket)
        .bind(user_id)
        .bind(service)
        .bind(granted_by_pgt)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_pt(&self, ticket: &str) -> Result<Option<ProxyTicket>, ApiError> {
        sqlx::query_as::<_, ProxyTicket>("SELECT * FROM proxy_tickets WHERE ticket = $1")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn consume_pt(&self, ticket: &str) -> Result<Option<ProxyTicket>, ApiError> {
        sqlx::query_as::<_, ProxyTicket>(
            r#"
            UPDATE proxy_tickets
            SET consumed_at = $1
            WHERE ticket = $2 AND consumed_at IS NULL AND expires_at > $1
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(ticket)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    // ----- Proxy-Granting Ticket -------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pgt(
        &self,
        ticket: &str,
        iou: &str,
        user_id: &str,
        service: &str,
        pgt_url: Option<&str>,
        granted_by_st: Option<&str>,
        granted_by_pt: Option<&str>,
        validity_seconds: i64,
    ) -> Result<ProxyGrantingTicket, ApiError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(validity_seconds);
        sqlx::query_as::<_, ProxyGrantingTicket>(
            r#"
            INSERT INTO proxy_granting_tickets
                (ticket, iou, user_id, service, pgt_url, granted_by_st, granted_by_pt, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(ticket)
        .bind(iou)
        .bind(user_id)
        .bind(service)
        .bind(pgt_url)
        .bind(granted_by_st)
        .bind(granted_by_pt)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_pgt(&self, ticket: &str) -> Result<Option<ProxyGrantingTicket>, ApiError> {
        sqlx::query_as::<_, ProxyGrantingTicket>(
            "SELECT * FROM proxy_granting_tickets WHERE ticket = $1",
        )
        .bind(ticket)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    // ----- Service registry ------------------------------------------------------------------

    pub async fn register_service(
        &self,
        request: RegisterServiceRequest,
    ) -> Result<CasServiceRegistration, ApiError> {
        sqlx::query_as::<_, CasServiceRegistration>(
            r#"
            INSERT INTO cas_services (service_id, name, service_url_pattern, require_secure)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&request.service_id)
        .bind(&request.name)
        .bind(&request.service_url_pattern)
        .bind(request.require_secure.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_service_by_url(
        &self,
        service_url: &str,
    ) -> Result<Option<CasServiceRegistration>, ApiError> {
        sqlx::query_as::<_, CasServiceRegistration>(
            "SELECT * FROM cas_services WHERE $1 ~ service_url_pattern AND is_enabled = TRUE",
        )
        .bind(service_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_services(&self) -> Result<Vec<CasServiceRegistration>, ApiError> {
        sqlx::query_as::<_, CasServiceRegistration>(
            "SELECT * FROM cas_services ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete_service(&self, service_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM cas_services WHERE service_id = $1")
            .bind(service_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ----- User attributes --------------------------------------------------------------------

    pub async fn set_user_attribute(
        &self,
        user_id: &str,
        attribute_name: &str,
        attribute_value: &str,
    ) -> Result<UserAttribute, ApiError> {
        sqlx::query_as::<_, UserAttribute>(
            r#"
            INSERT INTO cas_user_attributes (user_id, attribute_name, attribute_value, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, attribute_name)
            DO UPDATE SET attribute_value = $3, updated_at = $4
            RETURNING user_id, attribute_name, attribute_value
            "#,
        )
        .bind(user_id)
        .bind(attribute_name)
        .bind(attribute_value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_user_attributes(&self, user_id: &str) -> Result<Vec<UserAttribute>, ApiError> {
        sqlx::query_as::<_, UserAttribute>(
            "SELECT user_id, attribute_name, attribute_value FROM cas_user_attributes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    // ----- Cleanup (hook for the out-of-scope external purge job, §3) ------------------------

    pub async fn cleanup_expired(&self) -> Result<u64, ApiError> {
        let now = Utc::now();
        let mut total = 0u64;
        for table in [
            "service_tickets",
            "proxy_tickets",
            "proxy_granting_tickets",
            "ticket_granting_tickets",
        ] {
            let query = format!("DELETE FROM {table} WHERE expires_at < $1");
            let result = sqlx::query(&query).bind(now).execute(&self.pool).await?;
            total += result.rows_affected();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_service_request_defaults_require_secure_to_true() {
        let request = RegisterServiceRequest {
            service_id: "app1".to_string(),
            name: "App One".to_string(),
            service_url_pattern: "^https://app\\.example\\.com/.*$".to_string(),
            require_secure: None,
        };
        assert_eq!(request.require_secure, None);
    }

    #[test]
    fn service_ticket_round_trips_through_construction() {
        let ticket = ServiceTicket {
            ticket: "ST-0000000001-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            user_id: "ellen".to_string(),
            service: "http://www.example.com/".to_string(),
            granted_by_tgt: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(300),
            consumed_at: None,
        };
        assert!(ticket.consumed_at.is_none());
        assert_eq!(ticket.user_id, "ellen");
    }
}
