use super::*;

#[async_trait]
impl crate::traits::PlanStore for SqliteStateStore {
    async fn create_plan(&self, plan: &PrescriptionPlan) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO plans (person_id, name, times_per_day, dose_times, instructions, \
             active, window_start, window_end, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(plan.person_id)
        .bind(&plan.name)
        .bind(plan.times_per_day)
        .bind(&plan.dose_times)
        .bind(&plan.instructions)
        .bind(plan.active as i64)
        .bind(plan.window_start.to_rfc3339())
        .bind(plan.window_end.map(|t| t.to_rfc3339()))
        .bind(plan.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_plan(&self, id: i64) -> anyhow::Result<Option<PrescriptionPlan>> {
        let row = sqlx::query(
            "SELECT id, person_id, name, times_per_day, dose_times, instructions, active, \
             window_start, window_end, created_at FROM plans WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_plan(&r)))
    }

    async fn get_active_plans(&self, person_id: i64) -> anyhow::Result<Vec<PrescriptionPlan>> {
        let rows = sqlx::query(
            "SELECT id, person_id, name, times_per_day, dose_times, instructions, active, \
             window_start, window_end, created_at FROM plans \
             WHERE person_id = ? AND active = 1 ORDER BY name ASC",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_plan).collect())
    }

    async fn find_active_plan_by_name(
        &self,
        person_id: i64,
        name: &str,
    ) -> anyhow::Result<Option<PrescriptionPlan>> {
        let row = sqlx::query(
            "SELECT id, person_id, name, times_per_day, dose_times, instructions, active, \
             window_start, window_end, created_at FROM plans \
             WHERE person_id = ? AND LOWER(name) = ? AND active = 1",
        )
        .bind(person_id)
        .bind(name.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_plan(&r)))
    }

    async fn deactivate_expired_plans(
        &self,
        person_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        // Single UPDATE so a concurrent dose log on the same plan cannot
        // interleave with the flag flip. Expiry is monotonic, so
        // last-writer-wins is safe here.
        let result = sqlx::query(
            "UPDATE plans SET active = 0 \
             WHERE person_id = ? AND active = 1 AND window_end IS NOT NULL AND window_end < ?",
        )
        .bind(person_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
