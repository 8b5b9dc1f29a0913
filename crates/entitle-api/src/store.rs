//! # PostgreSQL Entitlement Store
//!
//! Reads and writes the subscription columns of the `users` table.
//! Every mutation is a single `UPDATE`, so concurrent deliveries of the same
//! event race inside the database and the guard decides the winner.

use async_trait::async_trait;
use entitle_core::{
    ApplyOutcome, EntitlementMutation, EntitlementRecord, EntitlementStore, StoreError, StoreResult,
    UserContact, UserId,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info, instrument};

/// Subscription facet of a `users` row
#[derive(sqlx::FromRow, Debug)]
struct EntitlementRow {
    id: i64,
    is_subscribed: bool,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
}

impl From<EntitlementRow> for EntitlementRecord {
    fn from(row: EntitlementRow) -> Self {
        EntitlementRecord {
            user_id: UserId(row.id),
            is_subscribed: row.is_subscribed,
            customer_ref: row.stripe_customer_id.filter(|c| !c.is_empty()),
            subscription_ref: row.stripe_subscription_id.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct ContactRow {
    email: String,
    username: String,
    full_name: Option<String>,
}

const FIND_BY_USER: &str = "SELECT id, is_subscribed, stripe_customer_id, stripe_subscription_id
     FROM users WHERE id = $1";

// Rows still holding a subscription sort first
const FIND_BY_CUSTOMER: &str = "SELECT id, is_subscribed, stripe_customer_id, stripe_subscription_id
     FROM users WHERE stripe_customer_id = $1
     ORDER BY is_subscribed DESC, (stripe_subscription_id IS NULL), id
     LIMIT 1";

const FIND_CONTACT: &str = "SELECT email, username, full_name FROM users WHERE id = $1";

// $4 guards the Unsubscribed -> Subscribed edge
const ACTIVATE: &str = "UPDATE users
     SET is_subscribed = TRUE,
         stripe_customer_id = $2,
         stripe_subscription_id = $3
     WHERE id = $1 AND (NOT $4 OR is_subscribed = FALSE)";

const DEACTIVATE: &str = "UPDATE users
     SET is_subscribed = FALSE,
         stripe_subscription_id = NULL
     WHERE stripe_customer_id = $1";

#[derive(Clone)]
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(store_error)?;

        info!("Connected to database");
        Ok(Self::new(pool))
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn find_by_user(&self, user_id: UserId) -> StoreResult<Option<EntitlementRecord>> {
        let row = sqlx::query_as::<_, EntitlementRow>(FIND_BY_USER)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(EntitlementRecord::from))
    }

    async fn find_by_customer_ref(&self, customer_ref: &str) -> StoreResult<Option<EntitlementRecord>> {
        let row = sqlx::query_as::<_, EntitlementRow>(FIND_BY_CUSTOMER)
            .bind(customer_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(EntitlementRecord::from))
    }

    async fn contact(&self, user_id: UserId) -> StoreResult<Option<UserContact>> {
        let row = sqlx::query_as::<_, ContactRow>(FIND_CONTACT)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(|r| UserContact::new(r.email, &r.username, r.full_name.as_deref())))
    }

    #[instrument(skip(self))]
    async fn apply(&self, mutation: &EntitlementMutation) -> StoreResult<ApplyOutcome> {
        let result = match mutation {
            EntitlementMutation::Unchanged => return Ok(ApplyOutcome::NoRowsAffected),

            EntitlementMutation::Activate {
                user_id,
                customer_ref,
                subscription_ref,
                require_unsubscribed,
            } => {
                sqlx::query(ACTIVATE)
                    .bind(user_id.0)
                    .bind(customer_ref)
                    .bind(subscription_ref)
                    .bind(*require_unsubscribed)
                    .execute(&self.pool)
                    .await
            }

            EntitlementMutation::Deactivate { customer_ref } => {
                sqlx::query(DEACTIVATE)
                    .bind(customer_ref)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(store_error)?;

        let rows = result.rows_affected();
        debug!(rows, "Entitlement update applied");
        Ok(ApplyOutcome::from_rows(rows))
    }
}
