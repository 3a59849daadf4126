use crate::models::{
    Campaign, CampaignRow, EngagementCounts, Location, LocationStats, NewCampaign, NewLocation,
    NewSession, SegmentCount, Session, SessionListing, Survey, SurveyListing,
};
use crate::storage::trait_def::decode_campaigns;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;

const CAMPAIGN_COLUMNS: &str =
    "id, brand_id, name, status, start_time, end_time, targeting, ab_test_variants, created_at";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                anon_id TEXT NOT NULL UNIQUE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id BIGSERIAL PRIMARY KEY,
                brand_id BIGINT,
                name TEXT NOT NULL,
                ap_identifier TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_ap ON locations(ap_identifier)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                location_id BIGINT,
                device_type TEXT,
                user_agent TEXT,
                started_at BIGINT NOT NULL,
                ended_at BIGINT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_location ON sessions(location_id, started_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS surveys (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL UNIQUE REFERENCES users(id),
                session_id BIGINT REFERENCES sessions(id),
                answers JSONB NOT NULL,
                submitted_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id BIGSERIAL PRIMARY KEY,
                brand_id BIGINT,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                start_time BIGINT,
                end_time BIGINT,
                targeting JSONB,
                ab_test_variants JSONB,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS impressions (
                id BIGSERIAL PRIMARY KEY,
                campaign_id BIGINT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                session_id BIGINT,
                shown_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id BIGSERIAL PRIMARY KEY,
                campaign_id BIGINT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                session_id BIGINT,
                clicked_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn find_user_id(&self, anon_id: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE anon_id = $1")
            .bind(anon_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(id)
    }

    async fn create_user(&self, anon_id: &str, created_at: i64) -> StorageResult<i64> {
        // RETURNING yields no row when the conflict clause fires
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (anon_id, created_at)
            VALUES ($1, $2)
            ON CONFLICT (anon_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(anon_id)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        id.ok_or(StorageError::Conflict)
    }

    async fn create_session(&self, session: &NewSession, started_at: i64) -> Result<Session> {
        let row = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, location_id, device_type, user_agent, started_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, location_id, device_type, user_agent, started_at, ended_at
            "#,
        )
        .bind(session.user_id)
        .bind(session.location_id)
        .bind(session.device_type.as_deref())
        .bind(session.user_agent.as_deref())
        .bind(started_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, location_id, device_type, user_agent, started_at, ended_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    async fn end_session(&self, session_id: i64, ended_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = COALESCE(ended_at, $1)
            WHERE id = $2
            "#,
        )
        .bind(ended_at)
        .bind(session_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions(&self, limit: i64, offset: i64) -> Result<Vec<SessionListing>> {
        let sessions = sqlx::query_as::<_, SessionListing>(
            r#"
            SELECT s.id, s.user_id, u.anon_id, s.location_id, l.name AS location_name,
                   l.brand_id, s.device_type, s.user_agent, s.started_at, s.ended_at
            FROM sessions s
            LEFT JOIN users u ON u.id = s.user_id
            LEFT JOIN locations l ON l.id = s.location_id
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(sessions)
    }

    async fn has_survey(&self, user_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM surveys WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    async fn create_survey(
        &self,
        user_id: i64,
        session_id: i64,
        answers: &Value,
        submitted_at: i64,
    ) -> StorageResult<Survey> {
        let survey = sqlx::query_as::<_, Survey>(
            r#"
            INSERT INTO surveys (user_id, session_id, answers, submitted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING id, user_id, session_id, answers, submitted_at
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(Json(answers))
        .bind(submitted_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        survey.ok_or(StorageError::Conflict)
    }

    async fn list_surveys(&self) -> Result<Vec<SurveyListing>> {
        let surveys = sqlx::query_as::<_, SurveyListing>(
            r#"
            SELECT v.id, v.user_id, u.anon_id, v.session_id, v.answers, v.submitted_at,
                   s.started_at AS session_started_at
            FROM surveys v
            JOIN users u ON u.id = v.user_id
            LEFT JOIN sessions s ON s.id = v.session_id
            ORDER BY v.submitted_at DESC, v.id DESC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(surveys)
    }

    async fn create_location(&self, location: &NewLocation, created_at: i64) -> Result<Location> {
        let row = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (brand_id, name, ap_identifier, latitude, longitude, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, brand_id, name, ap_identifier, latitude, longitude, created_at
            "#,
        )
        .bind(location.brand_id)
        .bind(&location.name)
        .bind(location.ap_identifier.as_deref())
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn find_location_by_ap(&self, ap_identifier: &str) -> Result<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(
            r#"
            SELECT id, brand_id, name, ap_identifier, latitude, longitude, created_at
            FROM locations
            WHERE ap_identifier = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(ap_identifier)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(location)
    }

    async fn location_session_counts(&self, since: i64) -> Result<Vec<LocationStats>> {
        let stats = sqlx::query_as::<_, LocationStats>(
            r#"
            SELECT l.id, l.name, l.latitude, l.longitude, COUNT(s.id) AS sessions_today
            FROM locations l
            LEFT JOIN sessions s ON s.location_id = l.id AND s.started_at >= $1
            WHERE l.latitude IS NOT NULL AND l.longitude IS NOT NULL
            GROUP BY l.id, l.name, l.latitude, l.longitude
            ORDER BY l.id
            "#,
        )
        .bind(since)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(stats)
    }

    async fn create_campaign(&self, campaign: &NewCampaign, created_at: i64) -> Result<Campaign> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            INSERT INTO campaigns
                (brand_id, name, status, start_time, end_time, targeting, ab_test_variants, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(campaign.brand_id)
        .bind(&campaign.name)
        .bind(&campaign.status)
        .bind(campaign.start_time)
        .bind(campaign.end_time)
        .bind(Json(&campaign.targeting))
        .bind(Json(&campaign.ab_test_variants))
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Campaign::try_from(row)?)
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(campaign_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Campaign::try_from).transpose()?)
    }

    async fn list_active_campaigns(&self, now: i64) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM campaigns
            WHERE status = 'active'
              AND (start_time IS NULL OR start_time <= $1)
              AND (end_time IS NULL OR end_time >= $1)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(now)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(decode_campaigns(rows))
    }

    async fn record_impression(
        &self,
        campaign_id: i64,
        session_id: Option<i64>,
        shown_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO impressions (campaign_id, session_id, shown_at) VALUES ($1, $2, $3)",
        )
        .bind(campaign_id)
        .bind(session_id)
        .bind(shown_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_click(
        &self,
        campaign_id: i64,
        session_id: Option<i64>,
        clicked_at: i64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO clicks (campaign_id, session_id, clicked_at) VALUES ($1, $2, $3)")
            .bind(campaign_id)
            .bind(session_id)
            .bind(clicked_at)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn engagement_counts(&self, since: Option<i64>) -> Result<EngagementCounts> {
        let since = since.unwrap_or(i64::MIN);
        let counts = sqlx::query_as::<_, EngagementCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM impressions WHERE shown_at >= $1) AS impressions,
                (SELECT COUNT(*) FROM clicks WHERE clicked_at >= $1) AS clicks,
                (SELECT COUNT(*) FROM sessions WHERE started_at >= $1) AS sessions
            "#,
        )
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(counts)
    }

    async fn campaign_engagement(&self, campaign_id: i64) -> Result<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM impressions WHERE campaign_id = $1),
                (SELECT COUNT(*) FROM clicks WHERE campaign_id = $1)
            "#,
        )
        .bind(campaign_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(counts)
    }

    async fn device_segments(&self) -> Result<Vec<SegmentCount>> {
        let segments = sqlx::query_as::<_, SegmentCount>(
            r#"
            SELECT COALESCE(device_type, 'unknown') AS segment, COUNT(*) AS sessions
            FROM sessions
            GROUP BY COALESCE(device_type, 'unknown')
            ORDER BY sessions DESC, segment
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(segments)
    }

    async fn visitor_segments(&self) -> Result<Vec<SegmentCount>> {
        let segments = sqlx::query_as::<_, SegmentCount>(
            r#"
            SELECT CASE WHEN sv.id IS NULL THEN 'first_time' ELSE 'repeat' END AS segment,
                   COUNT(s.id) AS sessions
            FROM sessions s
            LEFT JOIN surveys sv ON sv.user_id = s.user_id
            GROUP BY segment
            ORDER BY segment
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(segments)
    }
}
