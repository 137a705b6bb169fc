//! Postgres-backed implementation of [`Store`] (sqlx, runtime-checked
//! queries — no `DATABASE_URL` is required at build time, matching the
//! reference this crate's query style is grounded on).

use crate::shortcode::generate_short_code;
use crate::{AttributionCandidate, NewLink, Store, UpdateLink, UpdateWebhook};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkforty_core::config::StoreConfig;
use linkforty_core::error::{CoreError, CoreResult};
use linkforty_core::types::{
    ClickEvent, DeviceFingerprint, FingerprintSignals, InAppEvent,
    InstallEvent, Link, Template, UtmParameters, TargetingRules, Webhook, WebhookEventKind,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_SHORT_CODE_ATTEMPTS: u32 = 10;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        info!(pool_min = config.pool_min, pool_max = config.pool_max, "connecting to Postgres");
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min)
            .max_connections(config.pool_max)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct LinkRow {
    id: Uuid,
    short_code: String,
    template_id: Option<Uuid>,
    owner_id: Option<Uuid>,
    origin_url: String,
    ios_app_store_url: Option<String>,
    android_play_store_url: Option<String>,
    web_fallback_url: Option<String>,
    ios_universal_link: Option<String>,
    android_app_link: Option<String>,
    app_scheme: Option<String>,
    deep_link_path: Option<String>,
    deep_link_parameters: Json<HashMap<String, String>>,
    og_title: Option<String>,
    og_description: Option<String>,
    og_image_url: Option<String>,
    utm_parameters: Json<UtmParameters>,
    targeting_rules: Json<TargetingRules>,
    attribution_window_hours: i32,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            id: row.id,
            short_code: row.short_code,
            template_id: row.template_id,
            owner_id: row.owner_id,
            origin_url: row.origin_url,
            ios_app_store_url: row.ios_app_store_url,
            android_play_store_url: row.android_play_store_url,
            web_fallback_url: row.web_fallback_url,
            ios_universal_link: row.ios_universal_link,
            android_app_link: row.android_app_link,
            app_scheme: row.app_scheme,
            deep_link_path: row.deep_link_path,
            deep_link_parameters: row.deep_link_parameters.0,
            og_title: row.og_title,
            og_description: row.og_description,
            og_image_url: row.og_image_url,
            utm_parameters: row.utm_parameters.0,
            targeting_rules: row.targeting_rules.0,
            attribution_window_hours: row.attribution_window_hours as u32,
            is_active: row.is_active,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_link(&self, new_link: NewLink) -> CoreResult<Link> {
        for attempt in 0..MAX_SHORT_CODE_ATTEMPTS {
            let code = generate_short_code();
            let now = Utc::now();
            let result = sqlx::query_as::<_, LinkRow>(
                r#"
                INSERT INTO links (
                    id, short_code, template_id, owner_id, origin_url,
                    ios_app_store_url, android_play_store_url, web_fallback_url,
                    ios_universal_link, android_app_link, app_scheme, deep_link_path,
                    deep_link_parameters, og_title, og_description, og_image_url,
                    utm_parameters, targeting_rules, attribution_window_hours,
                    is_active, expires_at, created_at, updated_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, true, $20, $21, $21
                )
                ON CONFLICT (short_code) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&code)
            .bind(new_link.template_id)
            .bind(new_link.owner_id)
            .bind(&new_link.origin_url)
            .bind(&new_link.ios_app_store_url)
            .bind(&new_link.android_play_store_url)
            .bind(&new_link.web_fallback_url)
            .bind(&new_link.ios_universal_link)
            .bind(&new_link.android_app_link)
            .bind(&new_link.app_scheme)
            .bind(&new_link.deep_link_path)
            .bind(Json(&new_link.deep_link_parameters))
            .bind(&new_link.og_title)
            .bind(&new_link.og_description)
            .bind(&new_link.og_image_url)
            .bind(Json(&new_link.utm_parameters))
            .bind(Json(&new_link.targeting_rules))
            .bind(new_link.attribution_window_hours as i32)
            .bind(new_link.expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

            if let Some(row) = result {
                return Ok(row.into());
            }
            warn!(attempt, code, "short code collision, retrying");
        }
        Err(CoreError::DuplicateShortCode(MAX_SHORT_CODE_ATTEMPTS))
    }

    async fn get_link_by_id(&self, id: Uuid) -> CoreResult<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>("SELECT * FROM links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn get_link_by_code(&self, short_code: &str) -> CoreResult<Option<Link>> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, LinkRow>(
            "SELECT * FROM links WHERE short_code = $1 AND is_active AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(short_code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn get_link_scoped(&self, slug: &str, short_code: &str) -> CoreResult<Option<Link>> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT l.* FROM links l
            JOIN templates t ON t.id = l.template_id
            WHERE t.slug = $1 AND l.short_code = $2
              AND l.is_active AND (l.expires_at IS NULL OR l.expires_at > $3)
            "#,
        )
        .bind(slug)
        .bind(short_code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn update_link(&self, id: Uuid, update: UpdateLink) -> CoreResult<Link> {
        let existing = self
            .get_link_by_id(id)
            .await?
            .ok_or(CoreError::NotFound)?;

        let origin_url = update.origin_url.unwrap_or(existing.origin_url);
        let ios_app_store_url = update.ios_app_store_url.unwrap_or(existing.ios_app_store_url);
        let android_play_store_url = update
            .android_play_store_url
            .unwrap_or(existing.android_play_store_url);
        let web_fallback_url = update.web_fallback_url.unwrap_or(existing.web_fallback_url);
        let ios_universal_link = update.ios_universal_link.unwrap_or(existing.ios_universal_link);
        let android_app_link = update.android_app_link.unwrap_or(existing.android_app_link);
        let app_scheme = update.app_scheme.unwrap_or(existing.app_scheme);
        let deep_link_path = update.deep_link_path.unwrap_or(existing.deep_link_path);
        let deep_link_parameters = update
            .deep_link_parameters
            .unwrap_or(existing.deep_link_parameters);
        let og_title = update.og_title.unwrap_or(existing.og_title);
        let og_description = update.og_description.unwrap_or(existing.og_description);
        let og_image_url = update.og_image_url.unwrap_or(existing.og_image_url);
        let utm_parameters = update.utm_parameters.unwrap_or(existing.utm_parameters);
        let targeting_rules = update.targeting_rules.unwrap_or(existing.targeting_rules);
        let attribution_window_hours = update
            .attribution_window_hours
            .unwrap_or(existing.attribution_window_hours);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let expires_at = update.expires_at.unwrap_or(existing.expires_at);
        let now = Utc::now();

        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            UPDATE links SET
                origin_url = $2, ios_app_store_url = $3, android_play_store_url = $4,
                web_fallback_url = $5, ios_universal_link = $6, android_app_link = $7,
                app_scheme = $8, deep_link_path = $9, deep_link_parameters = $10,
                og_title = $11, og_description = $12, og_image_url = $13,
                utm_parameters = $14, targeting_rules = $15, attribution_window_hours = $16,
                is_active = $17, expires_at = $18, updated_at = $19
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&origin_url)
        .bind(&ios_app_store_url)
        .bind(&android_play_store_url)
        .bind(&web_fallback_url)
        .bind(&ios_universal_link)
        .bind(&android_app_link)
        .bind(&app_scheme)
        .bind(&deep_link_path)
        .bind(Json(&deep_link_parameters))
        .bind(&og_title)
        .bind(&og_description)
        .bind(&og_image_url)
        .bind(Json(&utm_parameters))
        .bind(Json(&targeting_rules))
        .bind(attribution_window_hours as i32)
        .bind(is_active)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(row.into())
    }

    async fn delete_link(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_template_by_slug(&self, slug: &str) -> CoreResult<Option<Template>> {
        let row = sqlx::query("SELECT id, slug, name, created_at FROM templates WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(|r| Template {
            id: r.get("id"),
            slug: r.get("slug"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    async fn insert_click(&self, click: ClickEvent) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO click_events (
                id, link_id, clicked_at, ip_address, user_agent, device_type,
                platform, platform_version, browser, geo, utm, referrer
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(click.id)
        .bind(click.link_id)
        .bind(click.clicked_at)
        .bind(&click.ip_address)
        .bind(&click.user_agent)
        .bind(click.device_type.as_str())
        .bind(&click.platform)
        .bind(&click.platform_version)
        .bind(&click.browser)
        .bind(Json(&click.geo))
        .bind(Json(&click.utm))
        .bind(&click.referrer)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn insert_fingerprint(&self, fingerprint: DeviceFingerprint) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO device_fingerprints (click_id, fingerprint_hash, signals) VALUES ($1, $2, $3)",
        )
        .bind(fingerprint.click_id)
        .bind(&fingerprint.fingerprint_hash)
        .bind(Json(&fingerprint.signals))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn candidate_clicks(
        &self,
        max_rows: u32,
        max_window_hours: u32,
    ) -> CoreResult<Vec<AttributionCandidate>> {
        let cutoff = Utc::now() - chrono::Duration::hours(max_window_hours as i64);
        let rows = sqlx::query(
            r#"
            SELECT c.id AS click_id, c.link_id, l.owner_id, c.clicked_at,
                   l.attribution_window_hours, f.signals
            FROM click_events c
            JOIN device_fingerprints f ON f.click_id = c.id
            JOIN links l ON l.id = c.link_id
            WHERE c.clicked_at > $1
            ORDER BY c.clicked_at DESC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(max_rows as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let signals: Json<FingerprintSignals> = r.get("signals");
                AttributionCandidate {
                    click_id: r.get("click_id"),
                    link_id: r.get("link_id"),
                    owner_id: r.get("owner_id"),
                    clicked_at: r.get("clicked_at"),
                    attribution_window_hours: {
                        let hours: i32 = r.get("attribution_window_hours");
                        hours as u32
                    },
                    signals: signals.0,
                }
            })
            .collect())
    }

    async fn insert_install(&self, install: InstallEvent) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO install_events (
                id, link_id, click_id, fingerprint_hash, confidence_score,
                installed_at, first_open_at, attribution_window_hours_used,
                signals, device_id, deep_link_payload, retrieved
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(install.id)
        .bind(install.link_id)
        .bind(install.click_id)
        .bind(&install.fingerprint_hash)
        .bind(install.confidence_score.map(|v| v as i16))
        .bind(install.installed_at)
        .bind(install.first_open_at)
        .bind(install.attribution_window_hours_used as i32)
        .bind(Json(&install.signals))
        .bind(&install.device_id)
        .bind(&install.deep_link_payload)
        .bind(install.retrieved)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_install_attribution(
        &self,
        install_id: Uuid,
        link_id: Uuid,
        click_id: Uuid,
        confidence_score: u8,
        deep_link_payload: serde_json::Value,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE install_events
            SET link_id = $2, click_id = $3, confidence_score = $4,
                deep_link_payload = $5, retrieved = true
            WHERE id = $1
            "#,
        )
        .bind(install_id)
        .bind(link_id)
        .bind(click_id)
        .bind(confidence_score as i16)
        .bind(&deep_link_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_install(&self, id: Uuid) -> CoreResult<Option<InstallEvent>> {
        let row = sqlx::query("SELECT * FROM install_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(install_from_row))
    }

    async fn get_install_by_fingerprint(
        &self,
        fingerprint_hash: &str,
    ) -> CoreResult<Option<InstallEvent>> {
        let row = sqlx::query(
            "SELECT * FROM install_events WHERE fingerprint_hash = $1 ORDER BY installed_at DESC LIMIT 1",
        )
        .bind(fingerprint_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(install_from_row))
    }

    async fn insert_in_app_event(&self, event: InAppEvent) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO in_app_events (id, install_id, event_name, properties, event_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(event.install_id)
        .bind(&event.event_name)
        .bind(Json(&event.properties))
        .bind(event.event_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn webhooks_for_owner_event(
        &self,
        owner_id: Uuid,
        kind: WebhookEventKind,
    ) -> CoreResult<Vec<Webhook>> {
        let rows = sqlx::query(
            "SELECT * FROM webhooks WHERE owner_id = $1 AND is_active AND subscribed_events @> $2",
        )
        .bind(owner_id)
        .bind(serde_json::json!([kind.as_str()]))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(rows.into_iter().map(webhook_from_row).collect())
    }

    async fn create_webhook(&self, webhook: Webhook) -> CoreResult<Webhook> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhooks (
                id, owner_id, name, url, secret, subscribed_events,
                is_active, max_attempts, timeout_ms, headers, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(webhook.id)
        .bind(webhook.owner_id)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.secret)
        .bind(Json(
            webhook
                .subscribed_events
                .iter()
                .map(|e| e.as_str())
                .collect::<Vec<_>>(),
        ))
        .bind(webhook.is_active)
        .bind(webhook.max_attempts as i32)
        .bind(webhook.timeout_ms as i64)
        .bind(Json(&webhook.headers))
        .bind(webhook.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(webhook_from_row(row))
    }

    async fn update_webhook(&self, id: Uuid, update: UpdateWebhook) -> CoreResult<Webhook> {
        let existing = self.get_webhook(id).await?.ok_or(CoreError::NotFound)?;
        let name = update.name.unwrap_or(existing.name);
        let url = update.url.unwrap_or(existing.url);
        let subscribed_events = update.subscribed_events.unwrap_or(existing.subscribed_events);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let max_attempts = update.max_attempts.unwrap_or(existing.max_attempts);
        let timeout_ms = update.timeout_ms.unwrap_or(existing.timeout_ms);
        let headers = update.headers.unwrap_or(existing.headers);
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            UPDATE webhooks SET
                name = $2, url = $3, subscribed_events = $4, is_active = $5,
                max_attempts = $6, timeout_ms = $7, headers = $8, updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(&url)
        .bind(Json(
            subscribed_events.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
        ))
        .bind(is_active)
        .bind(max_attempts as i32)
        .bind(timeout_ms as i64)
        .bind(Json(&headers))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(webhook_from_row(row))
    }

    async fn delete_webhook(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_webhook(&self, id: Uuid) -> CoreResult<Option<Webhook>> {
        let row = sqlx::query("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(webhook_from_row))
    }
}

fn install_from_row(r: sqlx::postgres::PgRow) -> InstallEvent {
    let signals: Json<FingerprintSignals> = r.get("signals");
    let confidence_score: Option<i16> = r.get("confidence_score");
    let attribution_window_hours_used: i32 = r.get("attribution_window_hours_used");
    InstallEvent {
        id: r.get("id"),
        link_id: r.get("link_id"),
        click_id: r.get("click_id"),
        fingerprint_hash: r.get("fingerprint_hash"),
        confidence_score: confidence_score.map(|v| v as u8),
        installed_at: r.get("installed_at"),
        first_open_at: r.get("first_open_at"),
        attribution_window_hours_used: attribution_window_hours_used as u32,
        signals: signals.0,
        device_id: r.get("device_id"),
        deep_link_payload: r.get("deep_link_payload"),
        retrieved: r.get("retrieved"),
    }
}

fn webhook_from_row(r: sqlx::postgres::PgRow) -> Webhook {
    let subscribed_events: Json<Vec<String>> = r.get("subscribed_events");
    let max_attempts: i32 = r.get("max_attempts");
    let timeout_ms: i64 = r.get("timeout_ms");
    let headers: Json<HashMap<String, String>> = r.get("headers");
    Webhook {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        name: r.get("name"),
        url: r.get("url"),
        secret: r.get("secret"),
        subscribed_events: subscribed_events
            .0
            .iter()
            .filter_map(|s| webhook_event_kind_from_str(s))
            .collect(),
        is_active: r.get("is_active"),
        max_attempts: max_attempts as u32,
        timeout_ms: timeout_ms as u64,
        headers: headers.0,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn webhook_event_kind_from_str(s: &str) -> Option<WebhookEventKind> {
    match s {
        "click_event" => Some(WebhookEventKind::ClickEvent),
        "install_event" => Some(WebhookEventKind::InstallEvent),
        "conversion_event" => Some(WebhookEventKind::ConversionEvent),
        _ => None,
    }
}
