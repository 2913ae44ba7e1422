use super::*;

#[async_trait]
impl crate::traits::DoseLogStore for SqliteStateStore {
    async fn log_dose(&self, log: &DoseLog) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO dose_log (plan_id, taken_at, slot) VALUES (?, ?, ?)",
        )
        .bind(log.plan_id)
        .bind(log.taken_at.to_rfc3339())
        .bind(log.slot)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_doses_for_day(
        &self,
        plan_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DoseLog>> {
        let (day_start, day_end) = super::day_bounds(now);

        let rows = sqlx::query(
            "SELECT id, plan_id, taken_at, slot FROM dose_log \
             WHERE plan_id = ? AND taken_at >= ? AND taken_at < ? ORDER BY taken_at ASC",
        )
        .bind(plan_id)
        .bind(&day_start)
        .bind(&day_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_dose_log).collect())
    }
}
